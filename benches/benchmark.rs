use criterion::{Criterion, black_box, criterion_group, criterion_main};
use molten::{Environment, Value};
use serde_json::json;

const PAGE: &str = "\
{% assign heading = site.title | upcase %}\
<h1>{{ heading }}</h1>\
<ul>\
{% for product in site.products %}\
  <li class=\"{% cycle 'odd', 'even' %}\">\
    {{ forloop.index }}. {{ product.name | capitalize }} - {{ product.price }}\
    {% if product.price > 50 %}(premium){% endif %}\
  </li>\
{% endfor %}\
</ul>";

fn globals() -> Value {
    let products: Vec<serde_json::Value> = (0..50)
        .map(|i| json!({"name": format!("product {i}"), "price": i * 3}))
        .collect();
    Value::from(json!({"site": {"title": "Benchmark", "products": products}}))
}

fn bench_parse(c: &mut Criterion) {
    let env = Environment::new();
    c.bench_function("parse_page", |b| {
        b.iter(|| env.from_string(black_box(PAGE)).unwrap())
    });
}

fn bench_render(c: &mut Criterion) {
    let env = Environment::new();
    let template = env.from_string(PAGE).unwrap();
    let data = globals();
    c.bench_function("render_page", |b| {
        b.iter(|| template.render(black_box(data.clone())).unwrap())
    });
}

fn bench_query(c: &mut Criterion) {
    let config = molten::QueryConfig::default();
    let query = molten::Query::parse("site.products[?@.price > 100].name", &config).unwrap();
    let data = globals();
    c.bench_function("query_filter", |b| {
        b.iter(|| query.find(black_box(&data), &config).unwrap())
    });
}

criterion_group!(benches, bench_parse, bench_render, bench_query);
criterion_main!(benches);
