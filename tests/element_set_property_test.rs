use std::collections::BTreeSet;

use dom_chain::{AnimateOptions, Document, NodeId, Result, query};
use proptest::collection::vec;
use proptest::prelude::*;
use proptest::test_runner::TestCaseResult;

fn class_name_strategy() -> BoxedStrategy<String> {
    prop_oneof![
        Just("a"),
        Just("b"),
        Just("item"),
        Just("is-active"),
        Just("x_1"),
        Just("panel"),
    ]
    .prop_map(str::to_string)
    .boxed()
}

fn property_strategy() -> BoxedStrategy<&'static str> {
    prop_oneof![
        Just("left"),
        Just("top"),
        Just("width"),
        Just("marginLeft"),
        Just("opacity"),
    ]
    .boxed()
}

fn to_test_case(result: Result<()>) -> TestCaseResult {
    result.map_err(|err| TestCaseError::fail(err.to_string()))
}

fn class_sets(doc: &Document, nodes: &[NodeId]) -> Result<Vec<BTreeSet<String>>> {
    nodes
        .iter()
        .map(|node| {
            Ok(doc
                .attribute(*node, "class")?
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string)
                .collect())
        })
        .collect()
}

fn assert_class_round_trip(initial: &[String], added: &str) -> TestCaseResult {
    let html = format!("<p class='{}'></p><p></p>", initial.join(" "));
    let doc = Document::from_html(&html).map_err(|err| TestCaseError::fail(err.to_string()))?;
    let set = query(&doc, "p").map_err(|err| TestCaseError::fail(err.to_string()))?;
    let before =
        class_sets(&doc, set.elements()).map_err(|err| TestCaseError::fail(err.to_string()))?;

    to_test_case(set.add_class(added).map(|_| ()))?;
    for node in set.elements() {
        prop_assert!(doc.has_class(*node, added).unwrap_or(false));
    }
    to_test_case(set.remove_class(added).map(|_| ()))?;

    let after =
        class_sets(&doc, set.elements()).map_err(|err| TestCaseError::fail(err.to_string()))?;
    prop_assert_eq!(before, after);
    Ok(())
}

fn assert_animation_converges(
    property: &str,
    start: i32,
    target: i32,
    fps: f64,
    duration: f64,
) -> TestCaseResult {
    let doc = Document::from_html("<div id='box'></div>")
        .map_err(|err| TestCaseError::fail(err.to_string()))?;
    let set = query(&doc, "#box").map_err(|err| TestCaseError::fail(err.to_string()))?;
    to_test_case(
        set.animate(
            [(property, f64::from(target))],
            AnimateOptions::new()
                .fps(fps)
                .duration(duration)
                .start(property, f64::from(start)),
            None,
        )
        .map(|_| ()),
    )?;
    to_test_case(doc.flush())?;

    let unit = if property == "opacity" { "" } else { "px" };
    let written = doc
        .style(set.elements()[0], property)
        .map_err(|err| TestCaseError::fail(err.to_string()))?;
    prop_assert_eq!(written, format!("{target}{unit}"));
    prop_assert!(!set.is_animating());
    prop_assert!(doc.pending_timers().is_empty());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn add_then_remove_class_restores_the_class_set(
        initial in vec(class_name_strategy(), 0..4),
        added in class_name_strategy(),
    ) {
        prop_assume!(!initial.contains(&added));
        assert_class_round_trip(&initial, &added)?;
    }

    #[test]
    fn animation_lands_exactly_on_the_target(
        property in property_strategy(),
        start in -500i32..500,
        target in -1_000i32..1_000,
        fps in 1.0f64..120.0,
        duration in 0.0f64..2_000.0,
    ) {
        assert_animation_converges(property, start, target, fps, duration)?;
    }

    #[test]
    fn negative_index_counts_back_from_the_end(count in 1usize..8, back in 1isize..12) {
        let html = "<i></i>".repeat(count);
        let doc = Document::from_html(&html).map_err(|err| TestCaseError::fail(err.to_string()))?;
        let set = query(&doc, "i").map_err(|err| TestCaseError::fail(err.to_string()))?;
        let len = set.len() as isize;
        let expected = if back <= len { set.element(len - back) } else { set.first() };
        prop_assert_eq!(set.element(-back), expected);
        prop_assert_eq!(set.element(-1), set.last());
    }

    #[test]
    fn inserted_markup_is_independent_per_target(count in 1usize..6, mutate in 0usize..6) {
        let html = "<div class='t'></div>".repeat(count);
        let doc = Document::from_html(&html).map_err(|err| TestCaseError::fail(err.to_string()))?;
        let targets = query(&doc, ".t").map_err(|err| TestCaseError::fail(err.to_string()))?;
        to_test_case(targets.append("<span class='s'>v</span>").map(|_| ()))?;

        let spans = query(&doc, ".s").map_err(|err| TestCaseError::fail(err.to_string()))?;
        prop_assert_eq!(spans.len(), count);
        let victim = spans.elements()[mutate % count];
        to_test_case(doc.set_text_content(victim, "changed"))?;
        for span in spans.elements() {
            let text = doc.text_content(*span).map_err(|err| TestCaseError::fail(err.to_string()))?;
            let expected = if *span == victim { "changed" } else { "v" };
            prop_assert_eq!(text, expected);
        }
    }
}
