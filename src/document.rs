use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

use fancy_regex::Regex;

use crate::animation::{PropertyAccessor, PropertyRegistry};
use crate::dom::{Dom, NodeId, NodeType};
use crate::dom_utils::js_prop_to_css_name;
use crate::events::{Event, EventHandler, Listener, ListenerStore};
use crate::html::parse_html;
use crate::ready::ReadyState;
use crate::timers::{PendingTimer, ScheduledTask, TimerCallback, TimerId, TimerQueue};
use crate::{Error, Result};

// `<tag>`, `<tag/>` and `<tag></tag>` skip the fragment parser.
static SINGLE_TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^<(\w+)\s*/?>(?:</\1>|)$").ok());

const COMPUTED_STYLE_DEFAULTS: &[(&str, &str)] = &[
    ("display", "block"),
    ("visibility", "visible"),
    ("opacity", "1"),
    ("width", "auto"),
    ("height", "auto"),
    ("top", "auto"),
    ("left", "auto"),
    ("right", "auto"),
    ("bottom", "auto"),
    ("margin-top", "0px"),
    ("margin-right", "0px"),
    ("margin-bottom", "0px"),
    ("margin-left", "0px"),
    ("padding-top", "0px"),
    ("padding-right", "0px"),
    ("padding-bottom", "0px"),
    ("padding-left", "0px"),
    ("min-width", "0px"),
    ("min-height", "0px"),
    ("max-width", "none"),
    ("font-size", "16px"),
    ("line-height", "normal"),
    ("z-index", "auto"),
];

/// Resolved style of an element: the defaults table overlaid with inline declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputedStyle {
    properties: HashMap<String, String>,
}

impl ComputedStyle {
    /// Accepts either `margin-left` or `marginLeft`.
    pub fn get(&self, property: &str) -> Option<&str> {
        self.properties
            .get(&js_prop_to_css_name(property))
            .map(String::as_str)
    }
}

struct DocumentState {
    dom: Dom,
    listeners: ListenerStore,
    timers: TimerQueue,
    ready_state: ReadyState,
    properties: PropertyRegistry,
    trace: bool,
    trace_events: bool,
    trace_timers: bool,
    trace_animation: bool,
    trace_logs: Vec<String>,
    trace_log_limit: usize,
}

impl DocumentState {
    fn new(dom: Dom, ready_state: ReadyState) -> Self {
        Self {
            dom,
            listeners: ListenerStore::default(),
            timers: TimerQueue::default(),
            ready_state,
            properties: PropertyRegistry::with_builtins(),
            trace: false,
            trace_events: true,
            trace_timers: true,
            trace_animation: true,
            trace_logs: Vec::new(),
            trace_log_limit: 10_000,
        }
    }

    fn trace_node_label(&self, node_id: NodeId) -> String {
        match self.dom.nodes.get(node_id.0).map(|node| &node.node_type) {
            Some(NodeType::Document) => "#document".into(),
            Some(NodeType::Text(_)) => "#text".into(),
            Some(NodeType::Element(element)) => match element.attrs.get("id") {
                Some(id) if !id.is_empty() => format!("{}#{id}", element.tag_name),
                _ => element.tag_name.clone(),
            },
            None => format!("#invalid({})", node_id.0),
        }
    }
}

/// Shared handle to an in-memory document.
///
/// Clones refer to the same tree. Timers only run when the virtual clock is driven with
/// [`advance_time`](Self::advance_time), [`run_due_timers`](Self::run_due_timers),
/// [`flush`](Self::flush) and friends. No internal borrow is held while listeners, timer
/// callbacks or ready actions run, so they may call back into the document.
#[derive(Clone)]
pub struct Document {
    state: Rc<RefCell<DocumentState>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_borrow() {
            Ok(state) => f
                .debug_struct("Document")
                .field("nodes", &state.dom.nodes.len())
                .field("ready_state", &state.ready_state)
                .field("now_ms", &state.timers.now_ms)
                .finish(),
            Err(_) => f.write_str("Document { <borrowed> }"),
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl Document {
    /// Empty document that is already complete.
    pub fn new() -> Self {
        Self::with_dom(Dom::new(), ReadyState::Complete)
    }

    /// Parses `html` into a complete document.
    pub fn from_html(html: &str) -> Result<Self> {
        Ok(Self::with_dom(parse_html(html)?, ReadyState::Complete))
    }

    /// Parses `html` into a document that is still loading; call
    /// [`mark_interactive`](Self::mark_interactive) to fire `DOMContentLoaded`.
    pub fn loading_from_html(html: &str) -> Result<Self> {
        Ok(Self::with_dom(parse_html(html)?, ReadyState::Loading))
    }

    fn with_dom(dom: Dom, ready_state: ReadyState) -> Self {
        Self {
            state: Rc::new(RefCell::new(DocumentState::new(dom, ready_state))),
        }
    }

    fn read<T>(&self, node_id: NodeId, f: impl FnOnce(&Dom) -> Result<T>) -> Result<T> {
        let state = self.state.borrow();
        state.dom.ensure_node(node_id)?;
        f(&state.dom)
    }

    fn write<T>(&self, nodes: &[NodeId], f: impl FnOnce(&mut Dom) -> Result<T>) -> Result<T> {
        let mut state = self.state.borrow_mut();
        for node_id in nodes {
            state.dom.ensure_node(*node_id)?;
        }
        f(&mut state.dom)
    }

    // Ready state

    pub fn ready_state(&self) -> ReadyState {
        self.state.borrow().ready_state
    }

    /// Moves a loading document to interactive and fires `DOMContentLoaded` on the
    /// document node. Does nothing if it already left the loading phase.
    pub fn mark_interactive(&self) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            if state.ready_state != ReadyState::Loading {
                return Ok(());
            }
            state.ready_state = ReadyState::Interactive;
        }
        self.trace_event_line(format!(
            "[event] ready_state={}",
            ReadyState::Interactive.as_str()
        ));
        self.dispatch(Event::new("DOMContentLoaded", self.root()).non_bubbling())?;
        Ok(())
    }

    pub fn mark_complete(&self) -> Result<()> {
        self.mark_interactive()?;
        self.state.borrow_mut().ready_state = ReadyState::Complete;
        self.trace_event_line(format!(
            "[event] ready_state={}",
            ReadyState::Complete.as_str()
        ));
        Ok(())
    }

    /// Runs `action` now if the document is ready, otherwise once on `DOMContentLoaded`.
    /// Returns whether it ran immediately.
    pub fn when_ready<F>(&self, action: F) -> bool
    where
        F: FnOnce(&Document) + 'static,
    {
        if self.ready_state().is_ready() {
            action(self);
            return true;
        }

        let pending = RefCell::new(Some(action));
        let handler = EventHandler::new(move |doc, _| {
            if let Some(action) = pending.borrow_mut().take() {
                action(doc);
            }
            Ok(())
        });
        let root = self.root();
        self.state.borrow_mut().listeners.add(
            root,
            "DOMContentLoaded".into(),
            Listener {
                handler,
                once: true,
            },
        );
        false
    }

    // Tree access

    pub fn root(&self) -> NodeId {
        self.state.borrow().dom.root
    }

    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        self.state.borrow().dom.by_id(id)
    }

    /// Elements matching `selector` in document order, restricted to the descendants of
    /// `scope` when one is given.
    pub fn query_selector_all(&self, scope: Option<NodeId>, selector: &str) -> Result<Vec<NodeId>> {
        self.state.borrow().dom.query_selector_all(scope, selector)
    }

    /// Materializes `markup` into a detached node.
    ///
    /// A bare tag (`<div>`, `<br/>`, `<p></p>`) is created directly; anything else goes
    /// through the fragment parser and its first top-level node is returned. Parse
    /// failures are logged and reported as `None`.
    pub fn create_element(&self, markup: &str) -> Option<NodeId> {
        let markup = markup.trim();
        if markup.is_empty() {
            return None;
        }
        match self.try_create_element(markup) {
            Ok(node) => node,
            Err(err) => {
                tracing::error!(%err, markup, "create_element failed");
                self.trace_line(format!(
                    "[dom] create_element failed markup={markup:?} error={err}"
                ));
                None
            }
        }
    }

    fn try_create_element(&self, markup: &str) -> Result<Option<NodeId>> {
        let single_tag = SINGLE_TAG
            .as_ref()
            .and_then(|re| re.captures(markup).ok().flatten())
            .and_then(|caps| caps.get(1).map(|tag| tag.as_str().to_ascii_lowercase()));

        let mut state = self.state.borrow_mut();
        if let Some(tag) = single_tag {
            return Ok(Some(state.dom.create_detached_element(tag)));
        }

        let holder = state.dom.create_detached_element("div".into());
        state.dom.set_inner_html(holder, markup)?;
        let first = state.dom.first_child(holder);
        if let Some(first) = first {
            state.dom.remove_child(holder, first)?;
        }
        Ok(first)
    }

    pub fn attribute(&self, node_id: NodeId, name: &str) -> Result<Option<String>> {
        self.read(node_id, |dom| Ok(dom.attr(node_id, name)))
    }

    pub fn set_attribute(&self, node_id: NodeId, name: &str, value: &str) -> Result<()> {
        self.write(&[node_id], |dom| dom.set_attr(node_id, name, value))
    }

    pub fn remove_attribute(&self, node_id: NodeId, name: &str) -> Result<()> {
        self.write(&[node_id], |dom| dom.remove_attr(node_id, name))
    }

    pub fn add_class(&self, node_id: NodeId, class_name: &str) -> Result<()> {
        self.write(&[node_id], |dom| dom.class_add(node_id, class_name))
    }

    pub fn remove_class(&self, node_id: NodeId, class_name: &str) -> Result<()> {
        self.write(&[node_id], |dom| dom.class_remove(node_id, class_name))
    }

    pub fn has_class(&self, node_id: NodeId, class_name: &str) -> Result<bool> {
        self.read(node_id, |dom| dom.class_contains(node_id, class_name))
    }

    /// Inline style value, empty when the declaration is absent.
    pub fn style(&self, node_id: NodeId, property: &str) -> Result<String> {
        self.read(node_id, |dom| dom.style_get(node_id, property))
    }

    /// Sets an inline declaration; an empty value removes it.
    pub fn set_style(&self, node_id: NodeId, property: &str, value: &str) -> Result<()> {
        self.write(&[node_id], |dom| dom.style_set(node_id, property, value))
    }

    pub fn computed_style(&self, node_id: NodeId) -> Result<ComputedStyle> {
        self.read(node_id, |dom| {
            let mut properties = COMPUTED_STYLE_DEFAULTS
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect::<HashMap<_, _>>();
            properties.extend(dom.style_declarations(node_id)?);
            Ok(ComputedStyle { properties })
        })
    }

    pub fn text_content(&self, node_id: NodeId) -> Result<String> {
        self.read(node_id, |dom| Ok(dom.text_content(node_id)))
    }

    pub fn set_text_content(&self, node_id: NodeId, text: &str) -> Result<()> {
        self.write(&[node_id], |dom| dom.set_text_content(node_id, text))
    }

    pub fn inner_html(&self, node_id: NodeId) -> Result<String> {
        self.read(node_id, |dom| dom.inner_html(node_id))
    }

    pub fn set_inner_html(&self, node_id: NodeId, html: &str) -> Result<()> {
        self.write(&[node_id], |dom| dom.set_inner_html(node_id, html))
    }

    pub fn outer_html(&self, node_id: NodeId) -> Result<String> {
        self.read(node_id, |dom| dom.outer_html(node_id))
    }

    pub fn value(&self, node_id: NodeId) -> Result<String> {
        self.read(node_id, |dom| dom.value(node_id))
    }

    pub fn set_value(&self, node_id: NodeId, value: &str) -> Result<()> {
        self.write(&[node_id], |dom| dom.set_value(node_id, value))
    }

    pub fn tag_name(&self, node_id: NodeId) -> Option<String> {
        self.state.borrow().dom.tag_name(node_id).map(str::to_string)
    }

    pub fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.state.borrow().dom.parent(node_id)
    }

    pub fn first_child(&self, node_id: NodeId) -> Option<NodeId> {
        self.state.borrow().dom.first_child(node_id)
    }

    pub fn next_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        self.state.borrow().dom.next_sibling(node_id)
    }

    /// All child nodes, text included.
    pub fn child_nodes(&self, node_id: NodeId) -> Vec<NodeId> {
        self.state.borrow().dom.children(node_id)
    }

    pub fn is_connected(&self, node_id: NodeId) -> bool {
        self.state.borrow().dom.is_connected(node_id)
    }

    /// Moves `child` to the end of `parent`, detaching it from its old position.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.write(&[parent, child], |dom| dom.append_child(parent, child))
    }

    pub fn insert_before(&self, parent: NodeId, child: NodeId, reference: NodeId) -> Result<()> {
        self.write(&[parent, child, reference], |dom| {
            dom.insert_before(parent, child, reference)
        })
    }

    pub fn remove_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.write(&[parent, child], |dom| dom.remove_child(parent, child))
    }

    pub fn replace_child(&self, parent: NodeId, replacement: NodeId, target: NodeId) -> Result<()> {
        self.write(&[parent, replacement, target], |dom| {
            dom.replace_child(parent, replacement, target)
        })
    }

    pub fn clone_node(&self, node_id: NodeId, deep: bool) -> Result<NodeId> {
        self.write(&[node_id], |dom| dom.clone_node(node_id, deep))
    }

    /// Makes `node_id` the active element, firing `blur` on the previous one and
    /// `focusin` / `focus` on the new one.
    pub fn focus(&self, node_id: NodeId) -> Result<()> {
        let previous = self.read(node_id, |dom| {
            if dom.element(node_id).is_none() {
                return Err(Error::Dom("focus target is not an element".into()));
            }
            Ok(dom.active_element)
        })?;
        if previous == Some(node_id) {
            return Ok(());
        }

        if let Some(previous) = previous {
            self.dispatch(Event::new("focusout", previous))?;
            self.dispatch(Event::new("blur", previous).non_bubbling())?;
        }
        self.state.borrow_mut().dom.set_active_element(Some(node_id));
        self.dispatch(Event::new("focusin", node_id))?;
        self.dispatch(Event::new("focus", node_id).non_bubbling())?;
        Ok(())
    }

    pub fn active_element(&self) -> Option<NodeId> {
        self.state.borrow().dom.active_element
    }

    /// Screen position of a popup element (`panel`, `menupopup`, `tooltip`).
    pub fn screen_position(&self, node_id: NodeId) -> Option<(f64, f64)> {
        self.state
            .borrow()
            .dom
            .popup_box(node_id)
            .map(|popup| (popup.screen_x, popup.screen_y))
    }

    pub fn move_to(&self, node_id: NodeId, screen_x: f64, screen_y: f64) -> Result<()> {
        self.write(&[node_id], |dom| dom.move_popup(node_id, screen_x, screen_y))
    }

    // Events

    pub fn add_event_listener(&self, node_id: NodeId, event_type: &str, handler: &EventHandler) {
        self.add_listener(node_id, event_type, handler, false);
    }

    /// Like [`add_event_listener`](Self::add_event_listener), removed before its first run.
    pub fn add_once_listener(&self, node_id: NodeId, event_type: &str, handler: &EventHandler) {
        self.add_listener(node_id, event_type, handler, true);
    }

    fn add_listener(&self, node_id: NodeId, event_type: &str, handler: &EventHandler, once: bool) {
        self.state.borrow_mut().listeners.add(
            node_id,
            event_type.to_string(),
            Listener {
                handler: handler.clone(),
                once,
            },
        );
    }

    pub fn remove_event_listener(
        &self,
        node_id: NodeId,
        event_type: &str,
        handler: &EventHandler,
    ) -> bool {
        self.state
            .borrow_mut()
            .listeners
            .remove(node_id, event_type, handler)
    }

    pub fn listener_count(&self, node_id: NodeId, event_type: &str) -> usize {
        self.state.borrow().listeners.count(node_id, event_type)
    }

    /// Fires a bubbling, cancelable event at `target` and returns it after dispatch.
    pub fn dispatch_event(
        &self,
        target: NodeId,
        event_type: &str,
        detail: Option<Rc<dyn Any>>,
    ) -> Result<Event> {
        self.read(target, |_| Ok(()))?;
        self.dispatch(Event::new(event_type, target).with_detail(detail))
    }

    fn dispatch(&self, mut event: Event) -> Result<Event> {
        let path = {
            let state = self.state.borrow();
            let mut path = Vec::new();
            let mut cursor = Some(event.target);
            while let Some(node) = cursor {
                path.push(node);
                cursor = if event.bubbles {
                    state.dom.parent(node)
                } else {
                    None
                };
            }
            path
        };

        for node in path {
            event.current_target = node;
            self.invoke_listeners(node, &mut event)?;
            if event.propagation_stopped {
                self.trace_event_done(&event, "propagation_stopped");
                return Ok(event);
            }
        }

        self.trace_event_done(&event, "completed");
        Ok(event)
    }

    fn invoke_listeners(&self, node_id: NodeId, event: &mut Event) -> Result<()> {
        let listeners = self.state.borrow().listeners.get(node_id, &event.event_type);
        for listener in listeners {
            if listener.once {
                self.state
                    .borrow_mut()
                    .listeners
                    .remove(node_id, &event.event_type, &listener.handler);
            }
            if self.event_tracing() {
                let (target, current) = {
                    let state = self.state.borrow();
                    (
                        state.trace_node_label(event.target),
                        state.trace_node_label(event.current_target),
                    )
                };
                self.trace_event_line(format!(
                    "[event] {} target={target} current={current} default_prevented={}",
                    event.event_type, event.default_prevented
                ));
            }
            listener.handler.call(self, event)?;
        }
        Ok(())
    }

    fn trace_event_done(&self, event: &Event, outcome: &str) {
        if !self.event_tracing() {
            return;
        }
        let (target, current) = {
            let state = self.state.borrow();
            (
                state.trace_node_label(event.target),
                state.trace_node_label(event.current_target),
            )
        };
        self.trace_event_line(format!(
            "[event] done {} target={target} current={current} outcome={outcome} default_prevented={} propagation_stopped={}",
            event.event_type, event.default_prevented, event.propagation_stopped
        ));
    }

    // Timers

    pub fn now_ms(&self) -> i64 {
        self.state.borrow().timers.now_ms
    }

    /// Schedules `callback` every `interval_ms` on the virtual clock.
    pub fn set_interval<F>(&self, interval_ms: i64, callback: F) -> TimerId
    where
        F: FnMut(&Document) -> Result<()> + 'static,
    {
        self.schedule(Rc::new(RefCell::new(callback)), interval_ms, true)
    }

    pub fn set_timeout<F>(&self, delay_ms: i64, callback: F) -> TimerId
    where
        F: FnMut(&Document) -> Result<()> + 'static,
    {
        self.schedule(Rc::new(RefCell::new(callback)), delay_ms, false)
    }

    fn schedule(&self, callback: TimerCallback, delay_ms: i64, repeat: bool) -> TimerId {
        let task = self.state.borrow_mut().timers.schedule(
            callback,
            delay_ms,
            repeat.then_some(delay_ms),
        );
        let kind = if repeat { "interval" } else { "timeout" };
        self.trace_timer_line(format!(
            "[timer] schedule {kind} id={} due_at={} delay_ms={}",
            task.id, task.due_at, delay_ms
        ));
        task.id
    }

    /// Cancels a pending or running timer. Returns whether it existed.
    pub fn clear_timer(&self, timer_id: TimerId) -> bool {
        let (existed, removed, running_canceled) = {
            let mut state = self.state.borrow_mut();
            let existed = state.timers.contains(timer_id);
            let (removed, running_canceled) = state.timers.clear(timer_id);
            (existed, removed, running_canceled)
        };
        self.trace_timer_line(format!(
            "[timer] clear id={timer_id} removed={removed} running_canceled={running_canceled}"
        ));
        existed
    }

    pub fn clear_all_timers(&self) -> usize {
        let cleared = self.state.borrow_mut().timers.clear_all();
        self.trace_timer_line(format!("[timer] clear_all cleared={cleared}"));
        cleared
    }

    pub fn pending_timers(&self) -> Vec<PendingTimer> {
        self.state.borrow().timers.pending()
    }

    /// Timer whose callback is executing right now, if any.
    pub fn running_timer(&self) -> Option<TimerId> {
        self.state.borrow().timers.running_timer_id
    }

    pub fn set_timer_step_limit(&self, max_steps: usize) -> Result<()> {
        if max_steps == 0 {
            return Err(Error::Timer(
                "set_timer_step_limit requires at least 1 step".into(),
            ));
        }
        self.state.borrow_mut().timers.step_limit = max_steps;
        Ok(())
    }

    pub fn advance_time(&self, delta_ms: i64) -> Result<()> {
        if delta_ms < 0 {
            return Err(Error::Timer(
                "advance_time requires non-negative milliseconds".into(),
            ));
        }
        let (from, to) = {
            let mut state = self.state.borrow_mut();
            let from = state.timers.now_ms;
            state.timers.now_ms = from.saturating_add(delta_ms);
            (from, state.timers.now_ms)
        };
        let ran = self.run_timer_queue(Some(to), false)?;
        self.trace_timer_line(format!(
            "[timer] advance delta_ms={delta_ms} from={from} to={to} ran_due={ran}"
        ));
        Ok(())
    }

    pub fn advance_time_to(&self, target_ms: i64) -> Result<()> {
        let from = {
            let mut state = self.state.borrow_mut();
            let from = state.timers.now_ms;
            if target_ms < from {
                return Err(Error::Timer(format!(
                    "advance_time_to requires target >= now_ms (target={target_ms}, now_ms={from})"
                )));
            }
            state.timers.now_ms = target_ms;
            from
        };
        let ran = self.run_timer_queue(Some(target_ms), false)?;
        self.trace_timer_line(format!(
            "[timer] advance_to from={from} to={target_ms} ran_due={ran}"
        ));
        Ok(())
    }

    /// Runs every timer already due without moving the clock.
    pub fn run_due_timers(&self) -> Result<usize> {
        let now_ms = self.now_ms();
        let ran = self.run_timer_queue(Some(now_ms), false)?;
        self.trace_timer_line(format!("[timer] run_due now_ms={now_ms} ran={ran}"));
        Ok(ran)
    }

    /// Runs the earliest pending timer, jumping the clock to its due time.
    pub fn run_next_timer(&self) -> Result<bool> {
        let next = self.state.borrow_mut().timers.take_next(None, true);
        let Some(task) = next else {
            self.trace_timer_line("[timer] run_next none".into());
            return Ok(false);
        };
        self.execute_timer_task(task)?;
        Ok(true)
    }

    /// Runs timers until the queue is empty, advancing the clock as it goes. Fails once
    /// the step limit is exceeded, which is how an interval nobody stops shows up.
    pub fn flush(&self) -> Result<()> {
        let from = self.now_ms();
        let ran = self.run_timer_queue(None, true)?;
        self.trace_timer_line(format!(
            "[timer] flush from={from} to={} ran={ran}",
            self.now_ms()
        ));
        Ok(())
    }

    fn run_timer_queue(&self, due_limit: Option<i64>, advance_clock: bool) -> Result<usize> {
        let mut steps = 0usize;
        loop {
            let task = {
                let mut state = self.state.borrow_mut();
                if !state.timers.has_next(due_limit) {
                    break;
                }
                steps += 1;
                if steps > state.timers.step_limit {
                    return Err(state.timers.step_limit_error(steps, due_limit));
                }
                state.timers.take_next(due_limit, advance_clock)
            };
            let Some(task) = task else {
                break;
            };
            self.execute_timer_task(task)?;
        }
        Ok(steps)
    }

    fn execute_timer_task(&self, task: ScheduledTask) -> Result<()> {
        let now_ms = {
            let mut state = self.state.borrow_mut();
            state.timers.begin_run(task.id);
            state.timers.now_ms
        };
        self.trace_timer_line(format!("[timer] run {} now_ms={now_ms}", task.describe()));

        let outcome = match task.callback.try_borrow_mut() {
            Ok(mut callback) => (&mut *callback)(self),
            Err(_) => Err(Error::Timer(format!(
                "timer {} re-entered its own callback",
                task.id
            ))),
        };
        if let Err(err) = outcome {
            self.state.borrow_mut().timers.abort_run();
            return Err(err);
        }

        let id = task.id;
        let requeued = self.state.borrow_mut().timers.finish_run(task);
        if let Some(due_at) = requeued {
            self.trace_timer_line(format!("[timer] requeue id={id} due_at={due_at}"));
        }
        Ok(())
    }

    // Special-case animatable properties

    pub fn register_property(&self, name: &str, accessor: PropertyAccessor) {
        self.state.borrow_mut().properties.register(name, accessor);
    }

    pub fn property_accessor(&self, name: &str) -> Option<PropertyAccessor> {
        self.state.borrow().properties.get(name)
    }

    // Trace buffer

    pub fn enable_trace(&self, enabled: bool) {
        self.state.borrow_mut().trace = enabled;
    }

    pub fn set_trace_events(&self, enabled: bool) {
        self.state.borrow_mut().trace_events = enabled;
    }

    pub fn set_trace_timers(&self, enabled: bool) {
        self.state.borrow_mut().trace_timers = enabled;
    }

    pub fn set_trace_animation(&self, enabled: bool) {
        self.state.borrow_mut().trace_animation = enabled;
    }

    pub fn set_trace_log_limit(&self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::Timer(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        let mut state = self.state.borrow_mut();
        state.trace_log_limit = max_entries;
        let overflow = state.trace_logs.len().saturating_sub(max_entries);
        state.trace_logs.drain(..overflow);
        Ok(())
    }

    pub fn take_trace_logs(&self) -> Vec<String> {
        std::mem::take(&mut self.state.borrow_mut().trace_logs)
    }

    fn event_tracing(&self) -> bool {
        let state = self.state.borrow();
        state.trace && state.trace_events
    }

    fn trace_event_line(&self, line: String) {
        tracing::trace!("{line}");
        if self.event_tracing() {
            self.trace_line(line);
        }
    }

    fn trace_timer_line(&self, line: String) {
        tracing::trace!("{line}");
        let enabled = {
            let state = self.state.borrow();
            state.trace && state.trace_timers
        };
        if enabled {
            self.trace_line(line);
        }
    }

    pub(crate) fn trace_animation_line(&self, line: String) {
        tracing::debug!("{line}");
        let enabled = {
            let state = self.state.borrow();
            state.trace && state.trace_animation
        };
        if enabled {
            self.trace_line(line);
        }
    }

    fn trace_line(&self, line: String) {
        let mut state = self.state.borrow_mut();
        if !state.trace {
            return;
        }
        if state.trace_logs.len() >= state.trace_log_limit {
            state.trace_logs.remove(0);
        }
        state.trace_logs.push(line);
    }
}
