use std::cell::Cell;
use std::rc::Rc;

use dom_chain::{
    AnimateOptions, Document, Error, EventHandler, Insertable, Query, Ready, ReadyState, query,
    ready,
};

#[test]
fn todo_list_is_built_through_chained_calls() -> dom_chain::Result<()> {
    let doc = Document::from_html("<ul id='todo'></ul><input id='entry' value='milk'>")?;
    let list = query(&doc, "#todo")?;
    let entry = query(&doc, "#entry")?;

    for _ in 0..2 {
        let item = query(&doc, "<li class='todo-item'></li>")?;
        item.set_text(&entry.value()?)?.add_class("new")?;
        list.append(&item)?;
    }
    entry.set_value("")?;

    let items = list.find("li.new")?;
    assert_eq!(items.len(), 2);
    assert_eq!(
        list.html()?,
        r#"<li class="todo-item new">milk</li><li class="todo-item new">milk</li>"#
    );
    assert_eq!(entry.value()?, "");
    Ok(())
}

#[test]
fn popup_slides_in_and_reports_completion() -> dom_chain::Result<()> {
    let doc = Document::from_html("<panel id='notice' left='-200' top='40'></panel>")?;
    let notice = query(&doc, "#notice")?;
    let done = Rc::new(Cell::new(false));
    let flag = Rc::clone(&done);

    notice.animate(
        [("panelX", 20.0)],
        AnimateOptions::on_complete(move || flag.set(true))
            .fps(25.0)
            .duration(200.0),
        None,
    )?;
    assert!(notice.is_animating());

    doc.advance_time(80)?;
    assert_eq!(doc.screen_position(notice.elements()[0]), Some((-112.0, 40.0)));
    assert!(!done.get());

    doc.flush()?;
    assert_eq!(doc.screen_position(notice.elements()[0]), Some((20.0, 40.0)));
    assert!(done.get());
    Ok(())
}

#[test]
fn ready_wires_handlers_after_content_loaded() -> dom_chain::Result<()> {
    let doc = Document::loading_from_html("<button id='go'></button><p id='status'>idle</p>")?;
    let outcome = ready(&doc, |doc| {
        let Ok(button) = query(doc, "#go") else {
            return;
        };
        button.on(
            "click",
            &EventHandler::new(|doc, _| {
                query(doc, "#status")?.set_text("clicked")?;
                Ok(())
            }),
        );
    });
    let Ready::Deferred(root) = outcome else {
        panic!("document is still loading");
    };
    assert_eq!(root.first(), Some(doc.root()));

    query(&doc, "#go")?.trigger("click", ())?;
    assert_eq!(query(&doc, "#status")?.text()?, "idle");

    doc.mark_complete()?;
    assert_eq!(doc.ready_state(), ReadyState::Complete);
    query(&doc, "#go")?.trigger("click", ())?;
    assert_eq!(query(&doc, "#status")?.text()?, "clicked");
    Ok(())
}

#[test]
fn explicit_query_and_insertable_variants() -> dom_chain::Result<()> {
    let doc = Document::from_html("<div id='host'></div>")?;
    let host = query(&doc, Query::Selector("#host".into()))?;
    let tag = query(&doc, Query::Markup("<em>e</em>".into()))?;

    host.append(Insertable::Markup("<b>b</b>".into()))?
        .append(Insertable::Collection(&tag))?
        .prepend(Insertable::Node(doc.create_element("<hr>").expect("hr")))?;
    assert_eq!(host.html()?, "<hr><b>b</b><em>e</em>");
    Ok(())
}

#[test]
fn empty_set_errors_name_the_operation() -> dom_chain::Result<()> {
    let doc = Document::new();
    let nothing = query(&doc, "p")?;
    let err = nothing.deep_clone().expect_err("no members");
    assert_eq!(err, Error::EmptySet { operation: "deep_clone" });
    assert_eq!(err.to_string(), "deep_clone called on an empty element set");
    Ok(())
}

#[test]
fn animation_without_explicit_start_reads_inline_style() -> dom_chain::Result<()> {
    let doc = Document::from_html("<div class='bar' style='width: 10px'></div><div class='bar' style='width: 50px'></div>")?;
    let bars = query(&doc, ".bar")?;
    bars.animate([("width", 100.0)], AnimateOptions::new().fps(20.0).duration(100.0), None)?;

    doc.run_next_timer()?;
    assert_eq!(doc.style(bars.elements()[0], "width")?, "55px");
    assert_eq!(doc.style(bars.elements()[1], "width")?, "75px");
    doc.flush()?;
    assert_eq!(doc.style(bars.elements()[0], "width")?, "100px");
    assert_eq!(doc.style(bars.elements()[1], "width")?, "100px");
    Ok(())
}
