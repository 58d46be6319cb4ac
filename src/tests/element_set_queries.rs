use super::*;
use std::ops::ControlFlow;

const LIST: &str = r#"
    <ul id='list'>
      <li class='item odd'>one</li>
      <li class='item'>two</li>
      <li class='item odd'>three</li>
    </ul>
    <p id='note' title='hello'>note</p>
"#;

#[test]
fn selector_query_keeps_document_order() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let odd = query(&doc, "li.odd")?;
    assert_eq!(odd.len(), 2);
    assert_eq!(odd.text()?, "one");
    let last = odd.last().expect("last member");
    assert_eq!(doc.text_content(last)?, "three");
    Ok(())
}

#[test]
fn zero_matches_give_an_empty_set() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let none = query(&doc, ".missing")?;
    assert_eq!(none.len(), 0);
    assert!(none.is_empty());
    assert_eq!(none.first(), None);
    assert_eq!(none.text(), Err(Error::EmptySet { operation: "text" }));
    assert_eq!(none.attr("id"), Err(Error::EmptySet { operation: "attr" }));
    assert_eq!(none.visible(), Err(Error::EmptySet { operation: "visible" }));

    none.add_class("ignored")?.set_text("ignored")?.css("left", "1px")?;
    Ok(())
}

#[test]
fn invalid_selector_propagates_host_error() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let result = query(&doc, "li >");
    assert!(matches!(result, Err(Error::UnsupportedSelector(_))));
    Ok(())
}

#[test]
fn markup_query_creates_a_detached_node() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let created = query(&doc, "<span class='tag'>hi</span>")?;
    assert_eq!(created.len(), 1);
    assert!(!created.exists()?);
    assert_eq!(created.outer_html()?, r#"<span class="tag">hi</span>"#);

    let bare = query(&doc, "<section/>")?;
    assert_eq!(bare.outer_html()?, "<section></section>");
    Ok(())
}

#[test]
fn broken_markup_is_logged_and_yields_an_empty_set() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    doc.enable_trace(true);
    let broken = query(&doc, "<div class='x'")?;
    assert!(broken.is_empty());

    let logs = doc.take_trace_logs();
    assert!(
        logs.iter()
            .any(|line| line.starts_with("[dom] create_element failed"))
    );
    Ok(())
}

#[test]
fn node_document_and_collection_queries_wrap_directly() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let note = doc.by_id("note").expect("note");

    let single = query(&doc, note)?;
    assert_eq!(single.elements(), &[note]);

    let whole = query(&doc, &doc)?;
    assert_eq!(whole.first(), Some(doc.root()));

    let items = query(&doc, ".item")?;
    let expected = items.elements().to_vec();
    let passed_through = query(&doc, items)?;
    assert_eq!(passed_through.elements(), expected.as_slice());

    let many = query(&doc, vec![note, doc.root()])?;
    assert_eq!(many.len(), 2);
    Ok(())
}

#[test]
fn negative_indices_count_from_the_end() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let items = query(&doc, "li")?;
    assert_eq!(items.element(-1), items.element(items.len() as isize - 1));
    assert_eq!(items.element(-3), items.first());
    assert_eq!(items.element(-10), items.first());
    assert_eq!(items.element(3), None);
    Ok(())
}

#[test]
fn each_stops_on_break() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let items = query(&doc, "li")?;
    let mut seen = Vec::new();
    items.each(|node, index| {
        seen.push((node, index));
        if index == 1 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].1, 1);
    Ok(())
}

#[test]
fn reverse_and_splice_keep_the_cached_length() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let mut items = query(&doc, "li")?;
    let original = items.elements().to_vec();

    items.reverse();
    assert_eq!(items.first(), original.last().copied());

    let extra = doc.by_id("note").expect("note");
    let removed = items.splice(-2, 2, [extra]);
    assert_eq!(removed, vec![original[1], original[0]]);
    assert_eq!(items.elements(), &[original[2], extra]);
    assert_eq!(items.len(), 3);
    Ok(())
}

#[test]
fn splice_clamps_out_of_range_start() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let mut items = query(&doc, "li")?;
    assert!(items.splice(10, 1, []).is_empty());
    assert_eq!(items.splice(-10, 1, []).len(), 1);
    assert_eq!(items.elements().len(), 2);
    Ok(())
}

#[test]
fn find_and_children_read_below_the_first_member() -> Result<()> {
    let doc = Document::from_html("<div id='a'><b>x</b>text<b>y</b></div><div><b>z</b></div>")?;
    let divs = query(&doc, "div")?;
    assert_eq!(divs.find("b")?.len(), 2);
    assert_eq!(divs.children()?.len(), 3);
    assert_eq!(divs.find("i")?.len(), 0);
    Ok(())
}

#[test]
fn parent_of_detached_member_is_empty() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let items = query(&doc, "li")?;
    let list = doc.by_id("list").expect("list");
    assert_eq!(items.parent()?.elements(), &[list]);

    let detached = query(&doc, "<em></em>")?;
    assert!(detached.parent()?.is_empty());
    Ok(())
}

#[test]
fn classes_are_restored_after_add_then_remove() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let items = query(&doc, "li")?;
    let before = items
        .elements()
        .iter()
        .map(|node| doc.attribute(*node, "class"))
        .collect::<Result<Vec<_>>>()?;

    items.add_class("active")?;
    assert!(doc.has_class(items.element(2).expect("third"), "active")?);
    items.remove_class("active")?;

    let after = items
        .elements()
        .iter()
        .map(|node| doc.attribute(*node, "class"))
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn attributes_and_empty_value_quirk() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let note = query(&doc, "#note")?;
    assert_eq!(note.attr("title")?.as_deref(), Some("hello"));
    assert_eq!(note.attr("missing")?, None);

    note.set_attr("title", "")?;
    assert_eq!(note.attr("title")?.as_deref(), Some("hello"));

    note.set_attr("title", "bye")?
        .set_attrs([("data-x", "1"), ("role", "note")])?;
    assert_eq!(note.attr("title")?.as_deref(), Some("bye"));
    assert_eq!(note.attr("data-x")?.as_deref(), Some("1"));
    assert_eq!(note.attr("role")?.as_deref(), Some("note"));
    Ok(())
}

#[test]
fn visibility_follows_show_and_hide() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let note = query(&doc, "#note")?;
    assert!(note.visible()?);

    note.hide()?;
    assert_eq!(doc.style(note.elements()[0], "visibility")?, "collapse");
    assert!(!note.visible()?);

    note.show()?;
    assert!(note.visible()?);

    note.css("visibility", "inherit")?;
    assert!(note.visible()?);
    note.css("visibility", "hidden")?;
    assert!(!note.visible()?);
    Ok(())
}

#[test]
fn css_map_writes_every_rule_on_every_member() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let items = query(&doc, "li")?;
    items.css_map([("color", "red"), ("marginLeft", "4px")])?;
    for node in items.elements() {
        assert_eq!(doc.style(*node, "color")?, "red");
        assert_eq!(doc.style(*node, "margin-left")?, "4px");
    }
    Ok(())
}

#[test]
fn unique_id_is_distinct_and_idempotent() -> Result<()> {
    let doc = Document::from_html(LIST)?;
    let items = query(&doc, "li")?;
    let first = items.unique_id()?;
    assert!(first.starts_with("_uuid-"));
    assert_eq!(items.unique_id()?, first);

    let ids = items
        .elements()
        .iter()
        .map(|node| doc.attribute(*node, "id"))
        .collect::<Result<Vec<_>>>()?;
    let mut distinct = ids.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), ids.len());

    assert_eq!(query(&doc, "#note")?.unique_id()?, "note");
    Ok(())
}

#[test]
fn value_reads_and_writes_form_state() -> Result<()> {
    let doc = Document::from_html("<input id='name' value='Taro'><input>")?;
    let inputs = query(&doc, "input")?;
    assert_eq!(inputs.value()?, "Taro");
    inputs.set_value("Hanako")?;
    assert_eq!(doc.value(inputs.element(1).expect("second"))?, "Hanako");
    Ok(())
}

#[test]
fn combinator_chains_backtrack_across_ancestors() -> Result<()> {
    let doc = Document::from_html(
        "<section><div class='outer'><div class='inner'><span id='t'></span></div></div></section>",
    )?;
    let span = doc.by_id("t").expect("span");
    assert_eq!(query(&doc, "section > div span")?.elements(), &[span]);
    assert_eq!(query(&doc, "section > .inner span")?.len(), 0);
    assert_eq!(query(&doc, "div:not(.outer) > span")?.elements(), &[span]);
    Ok(())
}
