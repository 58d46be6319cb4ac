//! Frame-stepped linear interpolation of named numeric properties.
//!
//! A run samples a starting value per node and property, derives a fixed increment from
//! the frame budget and then advances every animatable property once per tick of a
//! recurring host timer. The last frame writes the exact target.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::dom::NodeId;
use crate::dom_utils::{format_number, js_prop_to_css_name, parse_int_prefix};
use crate::timers::TimerId;
use crate::{Document, Error, Result};

/// Called once when a run that applied at least one frame ends.
pub type CompletionCallback = Box<dyn FnOnce()>;

pub type PropertyGetter = fn(&Document, NodeId) -> Result<Option<f64>>;
pub type PropertySetter = fn(&Document, NodeId, f64) -> Result<()>;

// Written as bare numbers; every other property gets a `px` unit.
const UNITLESS_PROPERTIES: [&str; 8] = [
    "opacity",
    "z-index",
    "font-weight",
    "line-height",
    "flex-grow",
    "flex-shrink",
    "order",
    "zoom",
];

/// Options for [`ElementSet::animate`](crate::ElementSet::animate).
///
/// Converts from `()` (defaults) and from a bare number, which is taken as the duration
/// in milliseconds.
pub struct AnimateOptions {
    pub(crate) fps: f64,
    pub(crate) duration: f64,
    pub(crate) complete: Option<CompletionCallback>,
    pub(crate) start: HashMap<String, f64>,
}

impl Default for AnimateOptions {
    fn default() -> Self {
        Self {
            fps: 30.0,
            duration: 400.0,
            complete: None,
            start: HashMap::new(),
        }
    }
}

impl fmt::Debug for AnimateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimateOptions")
            .field("fps", &self.fps)
            .field("duration", &self.duration)
            .field("complete", &self.complete.is_some())
            .field("start", &self.start)
            .finish()
    }
}

impl AnimateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults plus a completion callback.
    pub fn on_complete<F: FnOnce() + 'static>(complete: F) -> Self {
        Self::new().complete(complete)
    }

    pub fn fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn duration(mut self, duration_ms: f64) -> Self {
        self.duration = duration_ms;
        self
    }

    pub fn complete<F: FnOnce() + 'static>(mut self, complete: F) -> Self {
        self.complete = Some(Box::new(complete));
        self
    }

    /// Starting value for `property`, used instead of sampling the node.
    pub fn start(mut self, property: impl Into<String>, value: f64) -> Self {
        self.start.insert(property.into(), value);
        self
    }

    pub fn frame_budget(&self) -> FrameBudget {
        FrameBudget::new(self.fps, self.duration)
    }
}

impl From<()> for AnimateOptions {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<f64> for AnimateOptions {
    fn from(duration_ms: f64) -> Self {
        Self::new().duration(duration_ms)
    }
}

impl From<u32> for AnimateOptions {
    fn from(duration_ms: u32) -> Self {
        Self::new().duration(f64::from(duration_ms))
    }
}

/// Number of frames in a run and the spacing between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBudget {
    pub frame_count: u32,
    pub interval_ms: f64,
}

impl FrameBudget {
    /// `ceil(fps / 1000 * duration)` frames, at least one.
    pub fn new(fps: f64, duration_ms: f64) -> Self {
        let raw = (fps / 1000.0 * duration_ms).ceil();
        let frame_count = if raw.is_nan() || raw < 1.0 {
            1
        } else {
            raw.min(f64::from(u32::MAX)) as u32
        };
        Self {
            frame_count,
            interval_ms: duration_ms / f64::from(frame_count),
        }
    }

    /// Interval handed to the host timer, truncated to whole milliseconds.
    pub fn timer_interval_ms(&self) -> i64 {
        if self.interval_ms.is_finite() {
            self.interval_ms.trunc() as i64
        } else {
            0
        }
    }
}

/// Getter/setter pair for a property that does not live in the style attribute.
#[derive(Debug, Clone, Copy)]
pub struct PropertyAccessor {
    pub get: PropertyGetter,
    pub set: PropertySetter,
}

/// Named special-case properties consulted when computed style has no entry.
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    accessors: HashMap<String, PropertyAccessor>,
}

impl PropertyRegistry {
    /// Registry holding `panelX` and `panelY`, which move a popup on screen.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register(
            "panelX",
            PropertyAccessor {
                get: get_panel_x,
                set: set_panel_x,
            },
        );
        registry.register(
            "panelY",
            PropertyAccessor {
                get: get_panel_y,
                set: set_panel_y,
            },
        );
        registry
    }

    pub fn register(&mut self, name: &str, accessor: PropertyAccessor) {
        self.accessors.insert(name.to_string(), accessor);
    }

    pub fn get(&self, name: &str) -> Option<PropertyAccessor> {
        self.accessors.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.accessors.contains_key(name)
    }
}

fn popup_position(doc: &Document, node: NodeId, property: &str) -> Result<(f64, f64)> {
    doc.screen_position(node)
        .ok_or_else(|| Error::Dom(format!("{property} target is not a popup")))
}

fn get_panel_x(doc: &Document, node: NodeId) -> Result<Option<f64>> {
    Ok(doc.screen_position(node).map(|(x, _)| x.trunc()))
}

fn get_panel_y(doc: &Document, node: NodeId) -> Result<Option<f64>> {
    Ok(doc.screen_position(node).map(|(_, y)| y.trunc()))
}

fn set_panel_x(doc: &Document, node: NodeId, value: f64) -> Result<()> {
    let (_, y) = popup_position(doc, node, "panelX")?;
    doc.move_to(node, value, y)
}

fn set_panel_y(doc: &Document, node: NodeId, value: f64) -> Result<()> {
    let (x, _) = popup_position(doc, node, "panelY")?;
    doc.move_to(node, x, value)
}

/// Timer and completion callback of the run a collection is tracking.
#[derive(Default)]
pub(crate) struct AnimationSlot {
    timer: Option<TimerId>,
    complete: Option<CompletionCallback>,
    progressed: bool,
}

impl AnimationSlot {
    pub(crate) fn is_active(&self) -> bool {
        self.timer.is_some()
    }
}

struct PropertyTrack {
    name: String,
    target: f64,
    current: f64,
    increment: f64,
}

fn sample_property(
    doc: &Document,
    node: NodeId,
    property: &str,
    start: &HashMap<String, f64>,
) -> Result<f64> {
    if doc.tag_name(node).is_none() {
        return Ok(f64::NAN);
    }
    if let Some(value) = start.get(property) {
        return Ok(*value);
    }
    if let Some(raw) = doc.computed_style(node)?.get(property) {
        return Ok(parse_int_prefix(raw));
    }
    if let Some(accessor) = doc.property_accessor(property) {
        return Ok((accessor.get)(doc, node)?.unwrap_or(f64::NAN));
    }
    Ok(f64::NAN)
}

fn write_property(doc: &Document, node: NodeId, property: &str, value: f64) -> Result<()> {
    doc.trace_animation_line(format!(
        "[animation] set {property}={} node={}",
        format_number(value),
        node.0
    ));
    if let Some(accessor) = doc.property_accessor(property) {
        return (accessor.set)(doc, node, value);
    }
    let css_value = if UNITLESS_PROPERTIES.contains(&js_prop_to_css_name(property).as_str()) {
        format_number(value)
    } else {
        format!("{}px", format_number(value))
    };
    doc.set_style(node, property, &css_value)
}

/// Starts a run over `nodes`, replacing whatever run `slot` was tracking.
pub(crate) fn start(
    doc: &Document,
    nodes: &[NodeId],
    slot: &Rc<RefCell<AnimationSlot>>,
    targets: Vec<(String, f64)>,
    mut options: AnimateOptions,
    callback: Option<CompletionCallback>,
) -> Result<()> {
    stop(doc, slot);

    let budget = options.frame_budget();
    doc.trace_animation_line(format!(
        "[animation] start frames={} interval={}",
        budget.frame_count,
        format_number(budget.interval_ms)
    ));

    let mut runs: Vec<(NodeId, Vec<PropertyTrack>)> = Vec::new();
    for node in nodes {
        if runs.iter().any(|(seen, _)| seen == node) {
            continue;
        }
        let mut tracks = Vec::new();
        for (name, target) in &targets {
            let current = sample_property(doc, *node, name, &options.start)?;
            if current.is_nan() {
                continue;
            }
            tracks.push(PropertyTrack {
                name: name.clone(),
                target: *target,
                current,
                increment: (target - current) / f64::from(budget.frame_count),
            });
        }
        runs.push((*node, tracks));
    }

    let complete = options.complete.take().or(callback);
    let frame_count = budget.frame_count;
    let mut frame_counter = 0u32;
    let run_slot = Rc::clone(slot);
    let timer = doc.set_interval(budget.timer_interval_ms(), move |doc| {
        frame_counter += 1;
        let terminal = frame_counter >= frame_count;
        doc.trace_animation_line(format!("[animation] frame {frame_counter}/{frame_count}"));

        let applied = runs.iter_mut().try_for_each(|(node, tracks)| {
            tracks.iter_mut().try_for_each(|track| -> Result<()> {
                let value = if terminal {
                    track.target
                } else {
                    track.current + track.increment
                };
                write_property(doc, *node, &track.name, value)?;
                track.current = value;
                Ok(())
            })
        });
        if let Err(err) = applied {
            abandon(doc, &run_slot);
            return Err(err);
        }

        let owns_slot = {
            let mut slot = run_slot.borrow_mut();
            let owns_slot = slot.timer.is_some() && slot.timer == doc.running_timer();
            if owns_slot {
                slot.progressed = true;
            }
            owns_slot
        };
        if terminal {
            if owns_slot {
                stop(doc, &run_slot);
            } else if let Some(own) = doc.running_timer() {
                doc.clear_timer(own);
            }
        }
        Ok(())
    });

    let mut slot = slot.borrow_mut();
    slot.timer = Some(timer);
    slot.complete = complete;
    slot.progressed = false;
    Ok(())
}

// The driver drops the timer of a failed tick. Forget it without completing.
fn abandon(doc: &Document, slot: &RefCell<AnimationSlot>) {
    let discarded = {
        let mut slot = slot.borrow_mut();
        if slot.timer.is_none() || slot.timer != doc.running_timer() {
            return;
        }
        slot.timer = None;
        slot.progressed = false;
        slot.complete.take()
    };
    doc.trace_animation_line(format!(
        "[animation] abandon complete={}",
        discarded.is_some()
    ));
}

/// Cancels the tracked run. The completion callback fires only if a frame was applied.
pub(crate) fn stop(doc: &Document, slot: &RefCell<AnimationSlot>) {
    let (timer, complete) = {
        let mut slot = slot.borrow_mut();
        let Some(timer) = slot.timer.take() else {
            return;
        };
        let complete = slot.complete.take();
        let progressed = std::mem::take(&mut slot.progressed);
        (timer, complete.filter(|_| progressed))
    };

    doc.clear_timer(timer);
    doc.trace_animation_line(format!(
        "[animation] stop timer={timer} complete={}",
        complete.is_some()
    ));
    if let Some(complete) = complete {
        complete();
    }
}
