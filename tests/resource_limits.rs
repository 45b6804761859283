use pretty_assertions::assert_eq;
use serde_json::json;
use shimmyliquid::{object_from_json, ErrorKind, ErrorMode, Object, ParseOptions, Template};

const MEMORY_ERROR: &str = "Liquid error: Memory limits exceeded";

fn nested_ifs(depth: usize) -> String {
    format!("{}x{}", "{% if true %}".repeat(depth), "{% endif %}".repeat(depth))
}

fn nested_fors(depth: usize) -> String {
    format!(
        "{}x{}",
        "{% for i in (1..1) %}".repeat(depth),
        "{% endfor %}".repeat(depth)
    )
}

#[test]
fn parse_nesting_ceiling() {
    let mut template = Template::compile(&nested_ifs(100)).unwrap();
    assert_eq!(template.render(Object::new()).unwrap(), "x");

    let err = Template::compile(&nested_ifs(101)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StackLevel);
    assert_eq!(err.message(), "Nesting too deep");
}

#[test]
fn render_depth_ceiling() {
    let mut template = Template::compile(&nested_fors(100)).unwrap();
    assert_eq!(template.render(Object::new()).unwrap(), "x");
    assert_eq!(template.resource_limits().max_depth(), 100);

    let mut template = Template::compile(&nested_fors(3)).unwrap();
    template.resource_limits_mut().depth_limit = Some(2);
    assert_eq!(template.render(Object::new()).unwrap(), "Liquid error: Nesting too deep");
}

#[test]
fn render_length_counts_utf8_bytes() {
    let assigns = object_from_json(json!({"s": "すごい"}));
    let mut template = Template::compile("{{ s }}").unwrap();

    template.resource_limits_mut().render_length_limit = Some(9);
    assert_eq!(template.render(assigns.clone()).unwrap(), "すごい");
    assert!(!template.resource_limits().reached());

    template.resource_limits_mut().render_length_limit = Some(8);
    assert_eq!(template.render(assigns).unwrap(), MEMORY_ERROR);
    assert!(template.resource_limits().reached());
    assert_eq!(template.errors().last().map(|err| err.kind()), Some(ErrorKind::Memory));
}

#[test]
fn render_score_counts_nodes() {
    let mut template = Template::compile("{% for i in (1..10) %}x{% endfor %}").unwrap();
    template.resource_limits_mut().render_score_limit = Some(3);
    assert_eq!(template.render(Object::new()).unwrap(), MEMORY_ERROR);

    template.resource_limits_mut().render_score_limit = Some(11);
    assert_eq!(template.render(Object::new()).unwrap(), "xxxxxxxxxx");
    assert_eq!(template.resource_limits().render_score(), 11);
    assert!(!template.resource_limits().reached());
}

#[test]
fn assign_score_covers_assign_and_capture() {
    let mut template = Template::compile("{% assign x = 'abcdef' %}").unwrap();
    template.resource_limits_mut().assign_score_limit = Some(5);
    assert_eq!(template.render(Object::new()).unwrap(), MEMORY_ERROR);

    let mut template = Template::compile("{% capture c %}abcdef{% endcapture %}").unwrap();
    template.resource_limits_mut().assign_score_limit = Some(5);
    assert_eq!(template.render(Object::new()).unwrap(), MEMORY_ERROR);

    template.resource_limits_mut().assign_score_limit = Some(6);
    assert_eq!(template.render(Object::new()).unwrap(), "");
    assert_eq!(template.resource_limits().assign_score(), 6);
    assert_eq!(template.resource_limits().render_length(), 0);
}

#[test]
fn breach_inside_a_rescued_node_still_aborts() {
    let mut template = Template::compile("a{% if true %}{{ 'long text' }}{% endif %}b").unwrap();
    template.resource_limits_mut().render_length_limit = Some(5);
    assert_eq!(template.render(Object::new()).unwrap(), MEMORY_ERROR);
}

#[test]
fn range_endpoints_need_no_expansion() {
    let mut template = Template::compile("{{ (1..3000000000) | first }},{{ (1..3000000000) | last }},{{ (1..3000000000) | size }}").unwrap();
    template.resource_limits_mut().render_score_limit = Some(1000);
    assert_eq!(template.render(Object::new()).unwrap(), "1,3000000000,3000000000");
    assert!(!template.resource_limits().reached());
}

#[test]
fn expanding_a_huge_range_hits_the_score_limit() {
    for source in [
        "{{ (1..3000000000) | join }}",
        "{{ (1..3000000000) | reverse | first }}",
        "{{ (1..3000000000) | sort | last }}",
        "{{ (1..3000000000) | map: 'x' | size }}",
    ] {
        let mut template = Template::compile(source).unwrap();
        template.resource_limits_mut().render_score_limit = Some(1000);
        assert_eq!(template.render(Object::new()).unwrap(), MEMORY_ERROR, "{source}");
        assert!(template.resource_limits().reached(), "{source}");
    }
}

#[test]
fn small_ranges_expand_within_the_score_limit() {
    let mut template = Template::compile("{{ (1..5) | reverse | join: ',' }}").unwrap();
    template.resource_limits_mut().render_score_limit = Some(1000);
    assert_eq!(template.render(Object::new()).unwrap(), "5,4,3,2,1");
}

#[test]
fn for_over_a_huge_range_stops_at_the_score_limit() {
    let mut template = Template::compile("{% for i in (1..3000000000) %}{{ i }}{% endfor %}").unwrap();
    template.resource_limits_mut().render_score_limit = Some(1000);
    assert_eq!(template.render(Object::new()).unwrap(), MEMORY_ERROR);
    assert!(template.resource_limits().reached());
}

#[test]
fn deep_expressions_are_a_stack_level_error() {
    let subscripts = format!("{{{{ {}x{} }}}}", "a[".repeat(50_000), "]".repeat(50_000));
    let parens = format!("{{{{ {}1 }}}}", "(".repeat(50_000));
    let condition = format!("{{% if {}x{} %}}y{{% endif %}}", "a[".repeat(50_000), "]".repeat(50_000));

    for source in [&subscripts, &parens, &condition] {
        for mode in [ErrorMode::Lax, ErrorMode::Warn, ErrorMode::Strict] {
            let mut template = Template::new();
            let err = template
                .parse_with_options(source, ParseOptions::default().with_error_mode(mode))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::StackLevel, "{mode:?}");
        }
    }
}

#[test]
fn moderately_nested_expressions_still_parse() {
    let source = format!("{{{{ {}0{} }}}}", "a[".repeat(20), "]".repeat(20));
    let mut template = Template::compile(&source).unwrap();
    assert_eq!(template.render(Object::new()).unwrap(), "");
}
