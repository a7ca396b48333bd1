//! End-to-end rendering tests covering tags, scope behavior, whitespace
//! control and control-flow interrupts.

use async_trait::async_trait;
use molten::ast::{ChildNode, Flow, RenderResult, Signal};
use molten::context::RenderContext;
use molten::environment::{Options, Tag, UndefinedPolicy};
use molten::error::TemplateError;
use molten::loader::InMemoryLoader;
use molten::parser::Parser;
use molten::tokenizer::{Markup, TokenStream};
use molten::{Environment, Node, Object, Value};
use pretty_assertions::assert_eq;
use serde_json::json;

fn render(source: &str) -> String {
    let env = Environment::new();
    env.from_string(source)
        .unwrap()
        .render(Value::Null)
        .unwrap()
}

fn render_with(source: &str, globals: serde_json::Value) -> String {
    let env = Environment::new();
    env.from_string(source)
        .unwrap()
        .render(Value::from(globals))
        .unwrap()
}

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
fn test_assign_and_output() {
    assert_eq!(render("{% assign x = 1 %}{{ x }}"), "1");
}

#[test]
fn test_conditional_branches() {
    assert_eq!(
        render("{% if false %}a{% elsif true %}b{% else %}c{% endif %}"),
        "b"
    );
    assert_eq!(render("{% if true %}a{% else %}c{% endif %}"), "a");
    assert_eq!(render("{% if false %}a{% else %}c{% endif %}"), "c");
    assert_eq!(render("{% if false %}a{% endif %}"), "");
    assert_eq!(render("{% unless false %}a{% endunless %}"), "a");
    assert_eq!(
        render("{% unless true %}a{% else %}b{% endunless %}"),
        "b"
    );
}

#[test]
fn test_boolean_operators() {
    assert_eq!(render("{% if 1 == 1 and 'a' != 'b' %}y{% endif %}"), "y");
    assert_eq!(render("{% if false or true %}y{% endif %}"), "y");
    assert_eq!(render("{% if not false %}y{% endif %}"), "y");
    assert_eq!(render("{% if 2 > 1 and 1 <= 1 %}y{% endif %}"), "y");
    assert_eq!(
        render_with("{% if 'b' in letters %}y{% endif %}", json!({"letters": ["a", "b"]})),
        "y"
    );
    assert_eq!(render("{% if 'abc' contains 'b' %}y{% endif %}"), "y");
    assert_eq!(render("{% if 'abc' not contains 'z' %}y{% endif %}"), "y");
}

#[test]
fn test_structured_access() {
    assert_eq!(
        render_with("{{ x['y'].title }}", json!({"x": {"y": {"title": "T"}}})),
        "T"
    );
    assert_eq!(
        render_with("{{ items[1:3] | join: ',' }}", json!({"items": [0, 1, 2, 3, 4]})),
        "1,2"
    );
    assert_eq!(
        render_with("{{ a[b.c] }}", json!({"a": [10, 20, 30], "b": {"c": 2}})),
        "30"
    );
    assert_eq!(
        render_with(
            "{{ users[?@.age > 30] | map: 'name' | join: ',' }}",
            json!({"users": [
                {"name": "ada", "age": 36},
                {"name": "bob", "age": 17},
                {"name": "eve", "age": 45}
            ]})
        ),
        "ada,eve"
    );
}

#[test]
fn test_undefined_is_lenient_by_default() {
    assert_eq!(render("a{{ nosuch }}b"), "ab");
    assert_eq!(render("{% if nosuch %}x{% else %}y{% endif %}"), "y");
    assert_eq!(render("{% for x in nosuch %}x{% else %}none{% endfor %}"), "none");
}

#[test]
fn test_undefined_is_fatal_under_strict_policy() {
    let env = Environment::with_options(Options {
        undefined: UndefinedPolicy::Strict,
        ..Options::default()
    });
    let template = env.from_string("{{ nosuch }}").unwrap();
    let err = template.render(Value::Null).unwrap_err();
    assert!(matches!(err, TemplateError::Undefined { .. }));
}

#[test]
fn test_for_loop() {
    assert_eq!(render("{% for x in (1..4) %}{{ x }}{% endfor %}"), "1234");
    assert_eq!(
        render("{% for x in (1..6) limit: 2 offset: 2 %}{{ x }}{% endfor %}"),
        "34"
    );
    assert_eq!(
        render("{% for x in (1..3) reversed %}{{ x }}{% endfor %}"),
        "321"
    );
    assert_eq!(
        render_with(
            "{% for pair in m %}{{ pair[0] }}={{ pair[1] }};{% endfor %}",
            json!({"m": {"a": 1, "b": 2}})
        ),
        "a=1;b=2;"
    );
}

#[test]
fn test_for_loop_helper_variables() {
    assert_eq!(
        render("{% for x in (10..12) %}{{ forloop.index }}:{{ forloop.rindex }}{% unless forloop.last %},{% endunless %}{% endfor %}"),
        "1:3,2:2,3:1"
    );
    assert_eq!(
        render("{% for i in (1..2) %}{% for j in (1..2) %}{{ forloop.parentloop.index }}.{{ forloop.index }} {% endfor %}{% endfor %}"),
        "1.1 1.2 2.1 2.2 "
    );
}

#[test]
fn test_offset_continue() {
    assert_eq!(
        render("{% for x in (1..6) limit: 2 %}{{ x }}{% endfor %}{% for x in (1..6) offset: continue limit: 2 %}{{ x }}{% endfor %}"),
        "1234"
    );
}

#[test]
fn test_break_and_continue() {
    assert_eq!(
        render("{% for x in (1..5) %}{% if x == 3 %}{% break %}{% endif %}{{ x }}{% endfor %}"),
        "12"
    );
    assert_eq!(
        render("{% for x in (1..5) %}{% if x == 3 %}{% continue %}{% endif %}{{ x }}{% endfor %}"),
        "1245"
    );
    // Break applies to the nearest enclosing loop only.
    assert_eq!(
        render("{% for i in (1..2) %}{% for j in (1..9) %}{{ j }}{% break %}{% endfor %}{{ i }}{% endfor %}"),
        "1112"
    );
}

#[test]
fn test_interrupt_outside_a_loop_is_a_syntax_error() {
    let env = Environment::new();
    let template = env.from_string("a{% break %}b").unwrap();
    let err = template.render(Value::Null).unwrap_err();
    match err {
        TemplateError::Syntax { message, .. } => {
            assert_eq!(message, "unexpected 'break' outside of a loop");
        }
        other => panic!("expected a syntax error, found {other:?}"),
    }
}

#[test]
fn test_loop_stack_is_balanced_after_interrupted_renders() {
    let env = Environment::new();
    let template = env
        .from_string("{% for x in (1..5) %}{% break %}{% endfor %}")
        .unwrap();
    let mut context = RenderContext::new(&env, "test", Object::new());
    let mut buffer = String::new();
    assert_eq!(context.loop_depth(), 0);
    template.render_with_context(&mut context, &mut buffer).unwrap();
    assert_eq!(context.loop_depth(), 0);
}

#[test]
fn test_case_tag() {
    let source = "{% case x %}{% when 1 %}one{% when 2, 3 %}few{% else %}many{% endcase %}";
    assert_eq!(render_with(source, json!({"x": 1})), "one");
    assert_eq!(render_with(source, json!({"x": 3})), "few");
    assert_eq!(render_with(source, json!({"x": 9})), "many");
    // Every matching when block renders.
    assert_eq!(
        render_with(
            "{% case x %}{% when 1 %}a{% when 1 %}b{% endcase %}",
            json!({"x": 1})
        ),
        "ab"
    );
}

#[test]
fn test_capture() {
    assert_eq!(
        render("{% capture greeting %}Hello, {{ 'you' }}{% endcapture %}{{ greeting }}!"),
        "Hello, you!"
    );
}

#[test]
fn test_cycle() {
    assert_eq!(
        render("{% for x in (1..5) %}{% cycle 'a', 'b', 'c' %}{% endfor %}"),
        "abcab"
    );
    // Identical unnamed cycles share a position; a named group is distinct.
    assert_eq!(
        render("{% cycle 'a', 'b' %}{% cycle 'a', 'b' %}{% cycle 'g': 'a', 'b' %}"),
        "aba"
    );
}

#[test]
fn test_counters_are_render_wide() {
    assert_eq!(
        render("{% increment n %}-{% increment n %}-{% decrement n %}-{{ n }}"),
        "0-1-1-1"
    );
}

#[test]
fn test_comments_and_raw() {
    assert_eq!(render("a{# a note #}b"), "ab");
    assert_eq!(render("a{% # an inline note %}b"), "ab");
    assert_eq!(render("{% raw %}{{ not evaluated }}{% endraw %}"), "{{ not evaluated }}");
}

#[test]
fn test_liquid_line_statements() {
    assert_eq!(
        render("{% liquid\nassign x = 40\nassign y = x | plus: 2\necho y\n%}"),
        "42"
    );
    assert_eq!(
        render("{% liquid\nfor x in (1..3)\necho x\nendfor\n%}"),
        "123"
    );
}

#[test]
fn test_whitespace_control() {
    assert_eq!(render("a {{- 'x' }} b"), "ax b");
    assert_eq!(render("a {{- 'x' -}} b"), "axb");
    assert_eq!(render("{% if true -%}  x  {%- endif %}"), "x");
    // The closing tag's trailing flag applies to the following content.
    assert_eq!(render("{% if true %}x{% endif -%}  y"), "xy");
    // `~` strips newlines but keeps spaces.
    assert_eq!(render("a\n{{~ 'x' ~}}\n  b"), "ax  b");
}

#[test]
fn test_inline_conditions() {
    assert_eq!(render_with("{{ 'yes' if ok else 'no' }}", json!({"ok": true})), "yes");
    assert_eq!(render_with("{{ 'yes' if ok else 'no' }}", json!({"ok": false})), "no");
    assert_eq!(
        render_with("{{ 'yes' if ok else 'no' || upcase }}", json!({"ok": false})),
        "NO"
    );
}

#[test]
fn test_include_shares_scope() {
    let env = env_with_partials(&[("greet", "Hello, {{ name }}!")]);
    let template = env
        .from_string("{% assign name = 'World' %}{% include 'greet' %}")
        .unwrap();
    assert_eq!(template.render(Value::Null).unwrap(), "Hello, World!");
}

#[test]
fn test_include_with_arguments_and_binding() {
    let env = env_with_partials(&[("item", "[{{ item }}:{{ suffix }}]")]);
    let template = env
        .from_string("{% include 'item' with 'x', suffix: 's' %}")
        .unwrap();
    assert_eq!(template.render(Value::Null).unwrap(), "[x:s]");

    let template = env
        .from_string("{% include 'item' for things as item, suffix: 's' %}")
        .unwrap();
    assert_eq!(
        template
            .render(Value::from(json!({"things": [1, 2]})))
            .unwrap(),
        "[1:s][2:s]"
    );
}

#[test]
fn test_render_tag_isolates_scope() {
    let env = env_with_partials(&[("greet", "Hello, {{ name }}!")]);
    let template = env
        .from_string("{% assign name = 'World' %}{% render 'greet' %}")
        .unwrap();
    assert_eq!(template.render(Value::Null).unwrap(), "Hello, !");

    let template = env
        .from_string("{% render 'greet', name: 'Args' %}")
        .unwrap();
    assert_eq!(template.render(Value::Null).unwrap(), "Hello, Args!");
}

#[test]
fn test_break_in_included_partial_breaks_the_enclosing_loop() {
    let env = env_with_partials(&[("breaker", "{% break %}")]);
    let template = env
        .from_string("{% for i in (1..3) %}a{% include 'breaker' %}b{% endfor %}")
        .unwrap();
    assert_eq!(template.render(Value::Null).unwrap(), "a");
}

#[test]
fn test_break_escaping_a_render_partial_is_a_syntax_error() {
    let env = env_with_partials(&[("breaker", "{% break %}")]);
    let template = env
        .from_string("{% for i in (1..3) %}{% render 'breaker' %}{% endfor %}")
        .unwrap();
    assert!(matches!(
        template.render(Value::Null).unwrap_err(),
        TemplateError::Syntax { .. }
    ));
}

#[test]
fn test_recursive_include_trips_the_depth_guard() {
    let env = env_with_partials(&[("self", "{% include 'self' %}")]);
    let template = env.from_string("{% include 'self' %}").unwrap();
    let err = template.render(Value::Null).unwrap_err();
    assert!(matches!(err, TemplateError::ContextDepth { .. }));
}

#[test]
fn test_recursive_render_trips_the_depth_guard() {
    let env = env_with_partials(&[("self", "{% render 'self' %}")]);
    let template = env.from_string("{% render 'self' %}").unwrap();
    let err = template.render(Value::Null).unwrap_err();
    assert!(matches!(err, TemplateError::ContextDepth { .. }));
}

#[test]
fn test_missing_partial() {
    let env = Environment::new();
    let template = env.from_string("{% include 'nope' %}").unwrap();
    assert!(matches!(
        template.render(Value::Null).unwrap_err(),
        TemplateError::NotFound { .. }
    ));
}

#[test]
fn test_auto_escape() {
    let env = Environment::with_options(Options {
        auto_escape: true,
        ..Options::default()
    });
    let template = env.from_string("{{ x }}").unwrap();
    assert_eq!(
        template
            .render(Value::from(json!({"x": "<b>&</b>"})))
            .unwrap(),
        "&lt;b&gt;&amp;&lt;/b&gt;"
    );
}

/// A tag that raises the stop-render signal, standing in for constructs
/// whose rendering halts the template early.
struct HaltTag;

impl Tag for HaltTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        _parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        Ok(Box::new(HaltNode {
            token: stream.current().clone(),
        }))
    }
}

#[derive(Debug)]
struct HaltNode {
    token: Markup,
}

#[async_trait]
impl Node for HaltNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, _context: &mut RenderContext<'_>, _buffer: &mut String) -> RenderResult {
        Ok(Flow::Signal {
            kind: Signal::Stop,
            span: self.token.span(),
            written: 0,
        })
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        Vec::new()
    }
}

#[test]
fn test_stop_render_returns_partial_output() {
    let mut env = Environment::new();
    env.register_tag("halt", HaltTag);
    let template = env.from_string("a{% halt %}b").unwrap();
    assert_eq!(template.render(Value::Null).unwrap(), "a");

    // Stop escapes loops untouched and halts the whole render.
    let template = env
        .from_string("{% for x in (1..9) %}{{ x }}{% if x == 2 %}{% halt %}{% endif %}{% endfor %}rest")
        .unwrap();
    assert_eq!(template.render(Value::Null).unwrap(), "12");
}

/// A filter that reads render state, exercising context binding.
#[derive(Debug)]
struct TemplateNameFilter;

impl molten::Filter for TemplateNameFilter {
    fn call(
        &self,
        _left: &Value,
        _args: &molten::FilterArgs,
        state: &molten::FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let context = state.context.expect("context was requested");
        Ok(Value::String(context.template_name.clone()))
    }

    fn wants_context(&self) -> bool {
        true
    }
}

#[test]
fn test_filter_context_binding() {
    let mut env = Environment::new();
    env.register_filter("template_name", TemplateNameFilter);
    let template = env.from_string("{{ '' | template_name }}").unwrap();
    assert_eq!(template.render(Value::Null).unwrap(), "<string>");
}

#[test]
fn test_render_arguments_shadow_template_globals() {
    let env = Environment::new();
    let mut globals = Object::new();
    globals.insert("x".to_string(), Value::from("template"));
    globals.insert("y".to_string(), Value::from("kept"));
    let template = env
        .from_string("{{ x }}-{{ y }}")
        .unwrap()
        .with_globals(globals);
    assert_eq!(
        template.render(Value::from(json!({"x": "args"}))).unwrap(),
        "args-kept"
    );
}

#[test]
fn test_character_counts_from_render_with_context() {
    let env = Environment::new();
    let template = env.from_string("héllo {{ 'wörld' }}").unwrap();
    let mut context = RenderContext::new(&env, "test", Object::new());
    let mut buffer = String::new();
    let count = template.render_with_context(&mut context, &mut buffer).unwrap();
    assert_eq!(buffer, "héllo wörld");
    // Characters, not bytes.
    assert_eq!(count, 11);
}
