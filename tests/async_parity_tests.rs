//! Synchronous and suspension-capable rendering must be byte-identical,
//! with identical character counts, for every construct.

use molten::context::RenderContext;
use molten::loader::{FileSystemLoader, InMemoryLoader};
use molten::{Environment, Object, Value};
use pretty_assertions::assert_eq;
use serde_json::json;

fn env_with_partials(partials: &[(&str, &str)]) -> Environment {
    let loader = InMemoryLoader::new();
    for (name, source) in partials {
        loader.add(*name, *source);
    }
    let mut env = Environment::new();
    env.set_loader(loader);
    env
}

async fn assert_parity(env: &Environment, source: &str, globals: serde_json::Value) {
    let template = env.from_string(source).unwrap();

    let blocking = template.render(Value::from(globals.clone())).unwrap();
    let suspending = template.render_async(Value::from(globals)).await.unwrap();
    assert_eq!(blocking, suspending, "output diverged for {source:?}");

    // Character counts agree too.
    let mut sync_context = RenderContext::new(env, "parity", Object::new());
    let mut sync_buffer = String::new();
    let sync_count = template
        .render_with_context(&mut sync_context, &mut sync_buffer)
        .unwrap();

    let mut async_context = RenderContext::new(env, "parity", Object::new());
    let mut async_buffer = String::new();
    let async_count = template
        .render_with_context_async(&mut async_context, &mut async_buffer)
        .await
        .unwrap();

    assert_eq!(sync_buffer, async_buffer);
    assert_eq!(sync_count, async_count);
}

#[tokio::test]
async fn test_parity_for_core_constructs() {
    let env = Environment::new();
    let cases = [
        "plain text",
        "{% assign x = 'v' %}{{ x | upcase }}",
        "{% if false %}a{% elsif true %}b{% else %}c{% endif %}",
        "{% for x in (1..5) %}{{ x }}{% if x == 3 %}{% break %}{% endif %}{% endfor %}",
        "{% for x in (1..4) %}{% cycle 'a', 'b' %}{% endfor %}",
        "{% case 2 %}{% when 1 %}one{% when 2 %}two{% endcase %}",
        "{% capture c %}inner {{ 'text' }}{% endcapture %}[{{ c }}]",
        "{% increment n %}{% increment n %}{{ n }}",
        "{% liquid\nassign x = 2\necho x\n%}",
        "a {{- 'x' -}} b{% raw %} {{ r }} {% endraw %}",
        "{{ 'a,b' | split: ',' | join: '+' }}",
    ];
    for source in cases {
        assert_parity(&env, source, json!({})).await;
    }
}

#[tokio::test]
async fn test_parity_with_structured_data() {
    let env = Environment::new();
    let globals = json!({
        "site": {"pages": [{"title": "a"}, {"title": "b"}]},
        "nums": [3, 1, 2],
    });
    let cases = [
        "{{ site.pages[*].title | join: ',' }}",
        "{{ site.pages[?@.title == 'b'] | map: 'title' | join: '' }}",
        "{{ nums | sort | join: '-' }}{{ nums[-1] }}",
        "{% for page in site.pages %}{{ forloop.index }}:{{ page.title }} {% endfor %}",
    ];
    for source in cases {
        assert_parity(&env, source, globals.clone()).await;
    }
}

#[tokio::test]
async fn test_parity_through_partials() {
    let env = env_with_partials(&[
        ("greet", "Hello, {{ name | default: 'anyone' }}!"),
        ("outer", "[{% include 'inner' %}]"),
        ("inner", "{{ 'nested' | upcase }}"),
    ]);
    let cases = [
        "{% include 'greet' %}",
        "{% assign name = 'World' %}{% include 'greet' %}",
        "{% include 'outer' %}",
        "{% render 'greet', name: 'Args' %}",
    ];
    for source in cases {
        assert_parity(&env, source, json!({})).await;
    }
}

#[tokio::test]
async fn test_parity_with_filesystem_loader() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("partial.liquid"), "from disk: {{ n }}").unwrap();

    let mut env = Environment::new();
    env.set_loader(FileSystemLoader::new(dir.path()));

    assert_parity(
        &env,
        "{% include 'partial.liquid' %}",
        json!({"n": 42}),
    )
    .await;
}

#[tokio::test]
async fn test_interrupt_parity_through_included_partials() {
    let env = env_with_partials(&[("breaker", "x{% break %}y")]);
    let source = "{% for i in (1..3) %}{{ i }}{% include 'breaker' %}{% endfor %}done";
    let template = env.from_string(source).unwrap();

    let blocking = template.render(Value::Null).unwrap();
    let suspending = template.render_async(Value::Null).await.unwrap();
    assert_eq!(blocking, "1xdone");
    assert_eq!(blocking, suspending);
}
