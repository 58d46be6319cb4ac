use super::*;
use std::cell::RefCell;
use std::rc::Rc;

fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> EventHandler) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let make = move |label: &str| {
        let sink = Rc::clone(&sink);
        let label = label.to_string();
        EventHandler::new(move |doc, event| {
            let at = doc
                .tag_name(event.current_target)
                .unwrap_or_else(|| "#document".into());
            sink.borrow_mut()
                .push(format!("{label}:{}@{at}", event.event_type));
            Ok(())
        })
    };
    (log, make)
}

#[test]
fn trigger_bubbles_with_typed_detail() -> Result<()> {
    let doc = Document::from_html("<div id='outer'><button id='btn'>go</button></div>")?;
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    let handler = EventHandler::new(move |_, event| {
        if let Some(count) = event.detail::<u32>() {
            sink.borrow_mut().push(*count);
        }
        Ok(())
    });

    query(&doc, "#outer")?.on("picked", &handler);
    query(&doc, "#btn")?.trigger("picked", 7u32)?;
    assert_eq!(*received.borrow(), vec![7]);

    query(&doc, "#btn")?.trigger("picked", "not a number")?;
    assert_eq!(*received.borrow(), vec![7]);
    Ok(())
}

#[test]
fn off_removes_the_same_handler_from_every_member() -> Result<()> {
    let doc = Document::from_html("<p>a</p><p>b</p>")?;
    let (log, make) = recorder();
    let handler = make("h");
    let paragraphs = query(&doc, "p")?;

    paragraphs.on("ping", &handler).on("ping", &handler);
    for node in paragraphs.elements() {
        assert_eq!(doc.listener_count(*node, "ping"), 1);
    }
    paragraphs.trigger("ping", ())?;
    assert_eq!(log.borrow().len(), 2);

    paragraphs.off("ping", &handler);
    paragraphs.trigger("ping", ())?;
    assert_eq!(log.borrow().len(), 2);
    Ok(())
}

#[test]
fn listeners_may_stop_propagation_and_prevent_default() -> Result<()> {
    let doc = Document::from_html("<form id='f'><input id='i'></form>")?;
    let (log, make) = recorder();
    let input = doc.by_id("i").expect("input");
    let form = doc.by_id("f").expect("form");

    doc.add_event_listener(form, "submit", &make("form"));
    doc.add_event_listener(
        input,
        "submit",
        &EventHandler::new(|_, event| {
            event.prevent_default();
            event.stop_propagation();
            Ok(())
        }),
    );

    let event = doc.dispatch_event(input, "submit", None)?;
    assert!(event.default_prevented());
    assert!(event.propagation_stopped());
    assert!(log.borrow().is_empty());
    Ok(())
}

#[test]
fn once_listener_runs_a_single_time() -> Result<()> {
    let doc = Document::from_html("<b id='b'></b>")?;
    let (log, make) = recorder();
    let b = doc.by_id("b").expect("b");
    doc.add_once_listener(b, "tap", &make("once"));

    doc.dispatch_event(b, "tap", None)?;
    doc.dispatch_event(b, "tap", None)?;
    assert_eq!(*log.borrow(), vec!["once:tap@b"]);
    assert_eq!(doc.listener_count(b, "tap"), 0);
    Ok(())
}

#[test]
fn handlers_can_mutate_through_the_set() -> Result<()> {
    let doc = Document::from_html("<button id='btn'></button><p id='out'></p>")?;
    let handler = EventHandler::new(|doc, _| {
        query(doc, "#out")?.set_text("clicked")?.add_class("done")?;
        Ok(())
    });
    query(&doc, "#btn")?.on("click", &handler).trigger("click", ())?;

    let out = query(&doc, "#out")?;
    assert_eq!(out.text()?, "clicked");
    assert!(doc.has_class(out.elements()[0], "done")?);
    Ok(())
}

#[test]
fn focus_moves_between_members() -> Result<()> {
    let doc = Document::from_html("<input id='a'><input id='b'>")?;
    let (log, make) = recorder();
    let a = doc.by_id("a").expect("a");
    let b = doc.by_id("b").expect("b");
    for event in ["focus", "blur", "focusin", "focusout"] {
        doc.add_event_listener(a, event, &make("a"));
        doc.add_event_listener(b, event, &make("b"));
    }

    query(&doc, "#a")?.focus()?;
    query(&doc, "#b")?.focus()?;
    assert_eq!(doc.active_element(), Some(b));
    assert_eq!(
        *log.borrow(),
        vec![
            "a:focusin@input",
            "a:focus@input",
            "a:focusout@input",
            "a:blur@input",
            "b:focusin@input",
            "b:focus@input",
        ]
    );
    Ok(())
}

#[test]
fn ready_defers_until_content_loaded() -> Result<()> {
    let doc = Document::loading_from_html("<p id='p'></p>")?;
    let outcome = ready(&doc, |doc| {
        let _ = query(doc, "#p").and_then(|p| p.set_text("ready").map(|_| ()));
    });
    assert!(outcome.is_deferred());
    assert_eq!(doc.ready_state(), ReadyState::Loading);
    assert_eq!(query(&doc, "#p")?.text()?, "");

    doc.mark_interactive()?;
    assert_eq!(doc.ready_state(), ReadyState::Interactive);
    assert_eq!(query(&doc, "#p")?.text()?, "ready");

    doc.mark_complete()?;
    assert_eq!(doc.ready_state(), ReadyState::Complete);
    Ok(())
}

#[test]
fn ready_runs_immediately_once_interactive() -> Result<()> {
    let doc = Document::loading_from_html("<p></p>")?;
    doc.mark_interactive()?;
    let outcome = ready(&doc, |doc| doc.ready_state());
    assert_eq!(outcome.ran(), Some(ReadyState::Interactive));
    Ok(())
}

#[test]
fn content_loaded_does_not_bubble_and_fires_once() -> Result<()> {
    let doc = Document::loading_from_html("<p></p>")?;
    let (log, make) = recorder();
    doc.add_event_listener(doc.root(), "DOMContentLoaded", &make("root"));

    doc.mark_interactive()?;
    doc.mark_interactive()?;
    doc.mark_complete()?;
    assert_eq!(*log.borrow(), vec!["root:DOMContentLoaded@#document"]);
    Ok(())
}

#[test]
fn event_trace_records_dispatch() -> Result<()> {
    let doc = Document::from_html("<div id='d'></div>")?;
    doc.enable_trace(true);
    let (_, make) = recorder();
    let set = query(&doc, "#d")?;
    set.on("ping", &make("d")).trigger("ping", ())?;

    let logs = doc.take_trace_logs();
    assert!(logs.iter().any(|line| line.starts_with("[event] ping target=div#d")));
    assert!(
        logs.iter()
            .any(|line| line.starts_with("[event] done ping target=div#d"))
    );
    Ok(())
}
