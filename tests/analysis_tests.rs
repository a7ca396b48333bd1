//! Static analysis tests: reference collection with byte-offset spans,
//! local/global classification, partial following, and strict mode.

use molten::error::TemplateError;
use molten::loader::InMemoryLoader;
use molten::tokenizer::Span;
use molten::{Environment, Value};
use pretty_assertions::assert_eq;

fn env_with_partials(partials: &[(&str, &str)]) -> Environment {
    let loader = InMemoryLoader::new();
    for (name, source) in partials {
        loader.add(*name, *source);
    }
    let mut env = Environment::new();
    env.set_loader(loader);
    env
}

#[test]
fn test_assign_classification_and_spans() {
    let env = Environment::new();
    let template = env
        .from_string("{% assign x = y | append: z %}")
        .unwrap();
    let analysis = template.analyze(false).unwrap();

    assert_eq!(analysis.local_variables["x"], vec![Span::new(10, 11)]);
    assert_eq!(analysis.global_variables["y"], vec![Span::new(14, 15)]);
    assert_eq!(analysis.global_variables["z"], vec![Span::new(26, 27)]);
    assert_eq!(analysis.filters["append"], vec![Span::new(18, 24)]);
    assert!(!analysis.variables.contains_key("x"));
    assert!(analysis.variables.contains_key("y"));
    assert!(analysis.variables.contains_key("z"));
}

#[test]
fn test_path_references_are_normalized() {
    let env = Environment::new();
    let template = env.from_string("{{ x['y'].title }}").unwrap();
    let analysis = template.analyze(false).unwrap();

    assert_eq!(analysis.variables.len(), 1);
    assert_eq!(analysis.variables["x.y.title"], vec![Span::new(3, 15)]);
    assert_eq!(analysis.global_variables["x.y.title"], vec![Span::new(3, 15)]);
}

#[test]
fn test_classification_is_template_wide() {
    let env = Environment::new();
    let template = env.from_string("{{ x }}{% assign x = 1 %}").unwrap();
    let analysis = template.analyze(false).unwrap();

    // Used before assignment, but assignment anywhere makes it local
    // everywhere.
    assert!(analysis.variables.contains_key("x"));
    assert!(analysis.local_variables.contains_key("x"));
    assert!(!analysis.global_variables.contains_key("x"));
}

#[test]
fn test_loop_variables_are_block_scoped() {
    let env = Environment::new();
    let template = env
        .from_string("{% for item in items %}{{ item.name }}{{ forloop.index }}{% endfor %}")
        .unwrap();
    let analysis = template.analyze(false).unwrap();

    assert!(analysis.variables.contains_key("item.name"));
    assert!(analysis.variables.contains_key("forloop.index"));
    assert!(analysis.global_variables.contains_key("items"));
    assert!(!analysis.global_variables.contains_key("item.name"));
    assert!(!analysis.global_variables.contains_key("forloop.index"));
}

#[test]
fn test_nested_queries_are_reported_separately() {
    let env = Environment::new();
    let template = env.from_string("{{ a[b.c] }}").unwrap();
    let analysis = template.analyze(false).unwrap();

    assert!(analysis.variables.contains_key("a[b.c]"));
    assert!(analysis.variables.contains_key("b.c"));
    assert!(analysis.global_variables.contains_key("b.c"));
}

#[test]
fn test_tag_usage_is_recorded() {
    let env = Environment::new();
    let template = env
        .from_string("{% if x %}{% assign y = 1 %}{% endif %}{% if z %}{% endif %}")
        .unwrap();
    let analysis = template.analyze(false).unwrap();

    assert_eq!(analysis.tags["if"].len(), 2);
    assert_eq!(analysis.tags["assign"].len(), 1);
}

#[test]
fn test_unknown_filter_is_collected_not_raised() {
    let env = Environment::new();
    let template = env.from_string("{{ x | nosuchfilter }}").unwrap();
    let analysis = template.analyze(false).unwrap();

    assert!(analysis.failed_visits.contains_key("nosuchfilter"));
    assert!(analysis.filters.contains_key("nosuchfilter"));

    // Strict mode raises instead.
    let err = template.analyze(true).unwrap_err();
    assert!(matches!(err, TemplateError::NoSuchFilter { .. }));
}

#[test]
fn test_partials_are_followed() {
    let env = env_with_partials(&[("header", "{{ site.title | upcase }}")]);
    let template = env.from_string("{% include 'header' %}{{ page }}").unwrap();
    let analysis = template.analyze(false).unwrap();

    assert!(analysis.global_variables.contains_key("site.title"));
    assert!(analysis.global_variables.contains_key("page"));
    assert!(analysis.filters.contains_key("upcase"));
    assert!(analysis.unloadable_partials.is_empty());
}

#[test]
fn test_recursive_partials_terminate() {
    let env = env_with_partials(&[("self", "{% include 'self' %}{{ deep }}")]);
    let template = env.from_string("{% include 'self' %}").unwrap();
    let analysis = template.analyze(false).unwrap();
    assert!(analysis.global_variables.contains_key("deep"));
}

#[test]
fn test_unloadable_partials_are_collected_not_raised() {
    let env = Environment::new();
    let template = env.from_string("{% include 'missing' %}").unwrap();
    let analysis = template.analyze(false).unwrap();
    assert!(analysis.unloadable_partials.contains_key("missing"));

    let err = template.analyze(true).unwrap_err();
    assert!(matches!(err, TemplateError::NotFound { .. }));
}

#[test]
fn test_dynamic_partial_names_are_unloadable() {
    let env = Environment::new();
    let template = env.from_string("{% include partial_name %}").unwrap();
    let analysis = template.analyze(false).unwrap();

    assert!(analysis.unloadable_partials.contains_key("partial_name"));
    // The dynamic name is itself a variable reference.
    assert!(analysis.global_variables.contains_key("partial_name"));
}

#[test]
fn test_analysis_never_evaluates() {
    // A template whose rendering would fail analyzes cleanly.
    let env = Environment::new();
    let template = env.from_string("{{ 1 | divided_by: 0 }}").unwrap();
    assert!(template.render(Value::Null).is_err());
    assert!(template.analyze(false).is_ok());
}

#[tokio::test]
async fn test_sync_and_async_analysis_are_identical() {
    let env = env_with_partials(&[
        ("header", "{{ site.title }}"),
        ("footer", "{% include 'header' %}{{ year | default: 2024 }}"),
    ]);
    let template = env
        .from_string(
            "{% include 'footer' %}{% for x in xs %}{{ x | upcase }}{% endfor %}{{ gone }}",
        )
        .unwrap();

    let blocking = template.analyze(false).unwrap();
    let suspending = template.analyze_async(false).await.unwrap();
    assert_eq!(blocking, suspending);
}

#[test]
fn test_strict_analysis_of_good_template_passes() {
    let env = Environment::new();
    let template = env
        .from_string(
            "{% if true %}{{ x | upcase }}{% endif %}{% unless y %}{{ 'n' }}{% endunless %}",
        )
        .unwrap();
    assert!(template.analyze(true).is_ok());
}
