//! Host-side extension points: drops, custom tags and filters, exception
//! renderers and message tables.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use shimmyliquid::lexer::Tokenizer;
use shimmyliquid::tags::if_tag::If;
use shimmyliquid::{
    parse_block, unknown_tag, BlockBody, Context, Error, ErrorKind, LiquidDrop, Locale, Object,
    ParseContext, Registry, RenderOptions, Result, Tag, Template, Value,
};

#[derive(Debug)]
struct ProductDrop {
    name: String,
    price: i64,
    #[allow(dead_code)]
    cost: i64,
}

impl LiquidDrop for ProductDrop {
    fn accessors(&self) -> &'static [&'static str] {
        &["name", "price"]
    }

    fn call(&self, name: &str, _context: &Context<'_>) -> Result<Value> {
        Ok(match name {
            "name" => Value::from(self.name.as_str()),
            "price" => Value::Int(self.price),
            _ => Value::Nil,
        })
    }
}

fn product_assigns() -> Object {
    let mut assigns = Object::new();
    assigns.insert(
        "product".into(),
        Value::drop(ProductDrop {
            name: "Shoe".into(),
            price: 10,
            cost: 4,
        }),
    );
    assigns
}

fn render_with(registry: Registry, source: &str, assigns: Object) -> String {
    let mut template = Template::with_registry(Arc::new(registry));
    template.parse(source).unwrap();
    template.render(assigns).unwrap()
}

#[test]
fn drops_expose_only_their_accessors() {
    let source = "{{ product.name }}:{{ product.price }}:{{ product.cost }}";
    assert_eq!(render_with(Registry::new(), source, product_assigns()), "Shoe:10:");
}

#[test]
fn unknown_drop_methods_raise_under_strict_variables() {
    let mut template = Template::compile("{{ product.cost }}").unwrap();
    let out = template
        .render_with(product_assigns(), &RenderOptions::default().strict_variables())
        .unwrap();
    assert_eq!(out, "");
    assert_eq!(template.errors()[0].kind(), ErrorKind::UndefinedDropMethod);
}

#[test]
fn nil_from_a_drop_is_unordered() {
    let source = "{% if product.cost < 5 %}cheap{% else %}unknown{% endif %}";
    assert_eq!(render_with(Registry::new(), source, product_assigns()), "unknown");
}

#[test]
fn drops_work_with_filters() {
    let source = "{{ products | map: 'name' | join: ',' }}";
    let mut assigns = Object::new();
    let products = ["a", "b"]
        .iter()
        .map(|name| {
            Value::drop(ProductDrop {
                name: (*name).to_string(),
                price: 1,
                cost: 1,
            })
        })
        .collect();
    assigns.insert("products".into(), Value::Array(products));
    assert_eq!(render_with(Registry::new(), source, assigns), "a,b");
}

/// `{% shout %}...{% endshout %}` upper-cases its body.
#[derive(Debug)]
struct Shout {
    body: BlockBody,
}

impl Tag for Shout {
    fn name(&self) -> &str {
        "shout"
    }

    fn render(&self, context: &mut Context<'_>, output: &mut String) -> Result<()> {
        let mut inner = String::new();
        self.body.render(context, &mut inner)?;
        context.emit(output, &inner.to_uppercase())
    }
}

fn parse_shout(
    name: &str,
    _markup: &str,
    tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    let block = parse_block(name, tokens, ctx, |tag, _, ctx| Err(unknown_tag(name, tag, ctx)))?;
    let body = block.bodies.into_iter().next().unwrap_or_default();
    Ok(Box::new(Shout { body }))
}

fn parse_only(
    name: &str,
    markup: &str,
    tokens: &mut Tokenizer<'_>,
    ctx: &mut ParseContext<'_>,
) -> Result<Box<dyn Tag>> {
    Ok(Box::new(If::parse(name, markup, tokens, ctx, false)?))
}

#[test]
fn custom_block_tags() {
    let mut registry = Registry::new();
    registry.register_tag("shout", parse_shout).register_tag("only", parse_only);
    let mut assigns = Object::new();
    assigns.insert("name".into(), Value::from("bob"));

    let out = render_with(registry.clone(), "{% shout %}hi {{ name }}{% endshout %}", assigns.clone());
    assert_eq!(out, "HI BOB");

    let source = "{% only name == 'bob' %}yes{% else %}no{% endonly %}";
    assert_eq!(render_with(registry, source, assigns), "yes");
}

#[test]
fn custom_block_tags_must_close() {
    let mut registry = Registry::new();
    registry.register_tag("shout", parse_shout);
    let mut template = Template::with_registry(Arc::new(registry));
    let err = template.parse("{% shout %}hi{% endif %}").map(|_| ()).unwrap_err();
    assert_eq!(err.message(), "'endif' is not a valid delimiter for shout tags. use endshout");
}

#[test]
fn custom_filters_and_arity() {
    let mut registry = Registry::new();
    registry.register_filter("double", 0, 0, |input, _| Ok(Value::from(input.to_string().repeat(2))));
    assert_eq!(render_with(registry.clone(), "{{ 'ab' | double }}", Object::new()), "abab");
    assert_eq!(
        render_with(registry, "{{ 'ab' | double: 1 }}", Object::new()),
        "Liquid error: wrong number of arguments (given 2, expected 1)"
    );
}

#[test]
fn exception_renderer_replaces_inline_errors() {
    let registry = Registry::new().with_exception_renderer(|err| format!("<!-- {} -->", err.message()));
    let out = render_with(registry, "a{{ 1 | divided_by: 0 }}b", Object::new());
    assert_eq!(out, "a<!-- divided by 0 -->b");

    let mut template = Template::compile("{{ 1 | divided_by: 0 }}").unwrap();
    let options = RenderOptions::default().with_exception_renderer(|_| "oops".to_string());
    assert_eq!(template.render_with(Object::new(), &options).unwrap(), "oops");
}

#[test]
fn foreign_errors_propagate() {
    let mut registry = Registry::new();
    registry.register_filter("lookup", 0, 0, |_, _| Err(Error::foreign("database unavailable")));
    let mut template = Template::with_registry(Arc::new(registry));
    template.parse("before {{ x | lookup }} after").unwrap();
    let err = template.render(Object::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Foreign);
    assert_eq!(err.message(), "database unavailable");
}

#[test]
fn messages_can_be_translated() {
    let mut locale = Locale::new();
    locale.set("errors.syntax.unknown_tag", "Etiqueta desconocida '%{tag}'");
    let mut template = Template::with_registry(Arc::new(Registry::new().with_locale(locale)));
    let err = template.parse("{% nope %}").map(|_| ()).unwrap_err();
    assert_eq!(err.message(), "Etiqueta desconocida 'nope'");
}
