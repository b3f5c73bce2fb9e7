//! End-to-end scenarios: build a module through the fluent surface, load
//! it into the reference interpreter, run it, and assert on returned
//! values and host output.

use codeforge::{
    DataType, Decimal, DelegateTarget, ModuleGen, ParamDef, TypeHash, builtins, null,
};
use codeforge_vm::{Value, VmSink};

fn dt(hash: TypeHash) -> DataType {
    DataType::new(hash)
}

#[test]
fn bookstore_average_price_is_exact() {
    let mut m = ModuleGen::new("bookstore");

    let book = m.declare_struct("Book").unwrap();
    m.field(book, "title", dt(builtins::STRING)).unwrap();
    m.field(book, "price", dt(builtins::DECIMAL)).unwrap();
    let mut g = m
        .begin_ctor(
            book,
            vec![
                ParamDef::new("title", builtins::STRING),
                ParamDef::new("price", builtins::DECIMAL),
            ],
        )
        .unwrap();
    let this = g.this().unwrap();
    let title = g.field(&this, "title").unwrap();
    let value = g.arg("title").unwrap();
    g.assign(&title, value).unwrap();
    let price = g.field(&this, "price").unwrap();
    let value = g.arg("price").unwrap();
    g.assign(&price, value).unwrap();
    g.finish().unwrap();

    let db = m.declare_class("BookDb").unwrap();
    m.field(db, "books", dt(builtins::LIST)).unwrap();
    let mut g = m.begin_ctor(db, vec![]).unwrap();
    let this = g.this().unwrap();
    let books = g.field(&this, "books").unwrap();
    let empty = g.new_list().unwrap();
    g.assign(&books, empty).unwrap();
    g.finish().unwrap();

    let mut g = m
        .begin_method(
            db,
            "add_book",
            vec![
                ParamDef::new("title", builtins::STRING),
                ParamDef::new("price", builtins::DECIMAL),
            ],
            DataType::void(),
        )
        .unwrap();
    let this = g.this().unwrap();
    let books = g.field(&this, "books").unwrap();
    let title = g.arg("title").unwrap();
    let price = g.arg("price").unwrap();
    let created = g.new_obj(book, vec![title, price]).unwrap();
    g.invoke(&books, "add", vec![created]).unwrap();
    g.ret_void().unwrap();
    g.finish().unwrap();

    let mut g = m
        .begin_method(db, "average_price", vec![], dt(builtins::DECIMAL))
        .unwrap();
    let this = g.this().unwrap();
    let books = g.field(&this, "books").unwrap();
    let total = g
        .declare_init_as("total", dt(builtins::DECIMAL), Decimal::ZERO)
        .unwrap();
    let item = g.begin_foreach("b", dt(book), books.clone()).unwrap();
    let item_price = g.field(&item, "price").unwrap();
    g.add_assign(&total, item_price).unwrap();
    g.end().unwrap();
    let count = g.call(&books, "count", vec![]).unwrap();
    let average = g.div(total, count).unwrap();
    g.ret(average).unwrap();
    g.finish().unwrap();

    let app = m.declare_class("App").unwrap();
    let mut g = m
        .begin_static_method(app, "run", vec![], dt(builtins::DECIMAL))
        .unwrap();
    let created = g.new_obj(db, vec![]).unwrap();
    let store = g.declare_init("store", created).unwrap();
    for (title, cents) in [("Ada", 1995), ("Brook", 2500), ("Cozy", 600), ("Dune", 5000)] {
        g.invoke(
            &store,
            "add_book",
            vec![title.into(), Decimal::from_parts(cents, 2).into()],
        )
        .unwrap();
    }
    let average = g.call(&store, "average_price", vec![]).unwrap();
    g.ret(average).unwrap();
    g.finish().unwrap();

    let mut vm = m.finalize(&mut VmSink).unwrap();
    let result = vm.call_static("App", "run", vec![]).unwrap();
    let Value::Decimal(average) = result else {
        panic!("expected a decimal, got {result:?}");
    };
    // (19.95 + 25.00 + 6.00 + 50.00) / 4, with no binary rounding.
    assert_eq!(average, Decimal::from_parts(252375, 4));
    assert_eq!(average.to_string(), "25.2375");
}

#[test]
fn delegate_combine_and_remove_dispatch_in_order() {
    let mut m = ModuleGen::new("greet");
    let greeter = m
        .declare_delegate(
            "Greeter",
            vec![ParamDef::new("name", builtins::STRING)],
            DataType::void(),
        )
        .unwrap();

    let console = m.declare_class("Console").unwrap();
    for (name, text) in [("hello", "Hello, {0}"), ("goodbye", "Goodbye, {0}")] {
        let mut g = m
            .begin_static_method(
                console,
                name,
                vec![ParamDef::new("name", builtins::STRING)],
                DataType::void(),
            )
            .unwrap();
        let arg = g.arg("name").unwrap();
        g.write_line(text, vec![arg]).unwrap();
        g.ret_void().unwrap();
        g.finish().unwrap();
    }

    let app = m.declare_class("App").unwrap();
    let mut g = m
        .begin_static_method(app, "run", vec![], DataType::void())
        .unwrap();
    let hello = g
        .new_delegate(
            greeter,
            DelegateTarget::Static {
                owner: console,
                method: "hello".into(),
            },
        )
        .unwrap();
    let goodbye = g
        .new_delegate(
            greeter,
            DelegateTarget::Static {
                owner: console,
                method: "goodbye".into(),
            },
        )
        .unwrap();
    let combined = g.add(hello.clone(), goodbye).unwrap();
    let chain = g.declare_init("chain", combined).unwrap();
    g.invoke_delegate(chain.clone(), vec!["World".into()])
        .unwrap();
    let trimmed = g.sub(chain, hello).unwrap();
    let rest = g.declare_init("rest", trimmed).unwrap();
    g.invoke_delegate(rest, vec!["Again".into()]).unwrap();
    g.ret_void().unwrap();
    g.finish().unwrap();

    let mut vm = m.finalize(&mut VmSink).unwrap();
    vm.call_static("App", "run", vec![]).unwrap();
    assert_eq!(
        vm.output,
        ["Hello, World", "Goodbye, World", "Goodbye, Again"]
    );
}

#[test]
fn event_subscribe_raise_unsubscribe() {
    let mut m = ModuleGen::new("clicks");
    let notify = m
        .declare_delegate(
            "Notify",
            vec![ParamDef::new("msg", builtins::STRING)],
            DataType::void(),
        )
        .unwrap();

    let button = m.declare_class("Button").unwrap();
    m.event(button, "Clicked", notify).unwrap();
    let mut g = m
        .begin_method(
            button,
            "click",
            vec![ParamDef::new("msg", builtins::STRING)],
            DataType::void(),
        )
        .unwrap();
    let this = g.this().unwrap();
    let handlers = g.field(&this, "Clicked").unwrap();
    let has_handlers = g.ne(handlers.clone(), null()).unwrap();
    g.begin_if(has_handlers).unwrap();
    let msg = g.arg("msg").unwrap();
    g.invoke_delegate(handlers, vec![msg]).unwrap();
    g.end().unwrap();
    g.ret_void().unwrap();
    g.finish().unwrap();

    let log = m.declare_class("Log").unwrap();
    let mut g = m
        .begin_static_method(
            log,
            "record",
            vec![ParamDef::new("msg", builtins::STRING)],
            DataType::void(),
        )
        .unwrap();
    let msg = g.arg("msg").unwrap();
    g.write_line("clicked: {0}", vec![msg]).unwrap();
    g.ret_void().unwrap();
    g.finish().unwrap();

    let app = m.declare_class("App").unwrap();
    let mut g = m
        .begin_static_method(app, "run", vec![], DataType::void())
        .unwrap();
    // Button never declared a constructor; the default one is synthesized.
    let created = g.new_obj(button, vec![]).unwrap();
    let b = g.declare_init("b", created).unwrap();
    let handler = g
        .new_delegate(
            notify,
            DelegateTarget::Static {
                owner: log,
                method: "record".into(),
            },
        )
        .unwrap();
    g.subscribe(&b, "Clicked", handler.clone()).unwrap();
    g.invoke(&b, "click", vec!["first".into()]).unwrap();
    g.unsubscribe(&b, "Clicked", handler).unwrap();
    g.invoke(&b, "click", vec!["second".into()]).unwrap();
    g.ret_void().unwrap();
    g.finish().unwrap();

    let mut vm = m.finalize(&mut VmSink).unwrap();
    vm.call_static("App", "run", vec![]).unwrap();
    assert_eq!(vm.output, ["clicked: first"]);
}

#[test]
fn derived_member_hides_base_and_base_ref_reaches_it() {
    let mut m = ModuleGen::new("zoo");
    let animal = m.declare_class("Animal").unwrap();
    let mut g = m
        .begin_method(animal, "describe", vec![], dt(builtins::STRING))
        .unwrap();
    g.ret("animal").unwrap();
    g.finish().unwrap();

    let dog = m.declare_class_extending("Dog", animal).unwrap();
    let mut g = m
        .begin_method(dog, "describe", vec![], dt(builtins::STRING))
        .unwrap();
    g.ret("dog").unwrap();
    g.finish().unwrap();
    let mut g = m
        .begin_method(dog, "parent_view", vec![], dt(builtins::STRING))
        .unwrap();
    let base = g.base().unwrap();
    let described = g.call(&base, "describe", vec![]).unwrap();
    g.ret(described).unwrap();
    g.finish().unwrap();

    let app = m.declare_class("App").unwrap();
    for (name, method) in [("own", "describe"), ("parent", "parent_view")] {
        let mut g = m
            .begin_static_method(app, name, vec![], dt(builtins::STRING))
            .unwrap();
        let created = g.new_obj(dog, vec![]).unwrap();
        let d = g.declare_init("d", created).unwrap();
        let result = g.call(&d, method, vec![]).unwrap();
        g.ret(result).unwrap();
        g.finish().unwrap();
    }

    let mut vm = m.finalize(&mut VmSink).unwrap();
    let own = vm.call_static("App", "own", vec![]).unwrap();
    assert!(matches!(own, Value::Str(s) if *s == "dog"));
    let parent = vm.call_static("App", "parent", vec![]).unwrap();
    assert!(matches!(parent, Value::Str(s) if *s == "animal"));
}

#[test]
fn explicit_base_chaining_and_inherited_fields() {
    let mut m = ModuleGen::new("layout");
    let base = m.declare_class("Base").unwrap();
    m.field(base, "a", dt(builtins::INT32)).unwrap();
    let mut g = m
        .begin_ctor(base, vec![ParamDef::new("a", builtins::INT32)])
        .unwrap();
    let this = g.this().unwrap();
    let a = g.field(&this, "a").unwrap();
    let value = g.arg("a").unwrap();
    g.assign(&a, value).unwrap();
    g.finish().unwrap();

    let wide = m.declare_class_extending("Wide", base).unwrap();
    m.field_init(wide, "b", dt(builtins::INT32), 7).unwrap();
    let mut g = m.begin_ctor(wide, vec![]).unwrap();
    g.invoke_base_ctor(vec![35.into()]).unwrap();
    g.finish().unwrap();
    let mut g = m
        .begin_method(wide, "sum", vec![], dt(builtins::INT32))
        .unwrap();
    let this = g.this().unwrap();
    let a = g.field(&this, "a").unwrap();
    let b = g.field(&this, "b").unwrap();
    let total = g.add(a, b).unwrap();
    g.ret(total).unwrap();
    g.finish().unwrap();

    let app = m.declare_class("App").unwrap();
    let mut g = m
        .begin_static_method(app, "run", vec![], dt(builtins::INT32))
        .unwrap();
    let created = g.new_obj(wide, vec![]).unwrap();
    let w = g.declare_init("w", created).unwrap();
    let sum = g.call(&w, "sum", vec![]).unwrap();
    g.ret(sum).unwrap();
    g.finish().unwrap();

    let mut vm = m.finalize(&mut VmSink).unwrap();
    let result = vm.call_static("App", "run", vec![]).unwrap();
    assert!(matches!(result, Value::Int32(42)));
}

#[test]
fn static_fields_persist_across_calls() {
    let mut m = ModuleGen::new("tally");
    let t = m.declare_class("Tally").unwrap();
    m.static_field(t, "count", dt(builtins::INT32)).unwrap();
    let mut g = m
        .begin_static_method(t, "bump", vec![], dt(builtins::INT32))
        .unwrap();
    let count = g.static_field(t, "count").unwrap();
    g.add_assign(&count, 1).unwrap();
    g.ret(count).unwrap();
    g.finish().unwrap();

    let mut vm = m.finalize(&mut VmSink).unwrap();
    let first = vm.call_static("Tally", "bump", vec![]).unwrap();
    assert!(matches!(first, Value::Int32(1)));
    let second = vm.call_static("Tally", "bump", vec![]).unwrap();
    assert!(matches!(second, Value::Int32(2)));
}

#[test]
fn indexer_reads_and_writes_list_elements() {
    let mut m = ModuleGen::new("cells");
    let app = m.declare_class("App").unwrap();
    let mut g = m
        .begin_static_method(app, "run", vec![], dt(builtins::OBJECT))
        .unwrap();
    let empty = g.new_list().unwrap();
    let items = g.declare_init("items", empty).unwrap();
    g.invoke(&items, "add", vec!["zero".into()]).unwrap();
    g.invoke(&items, "add", vec!["one".into()]).unwrap();
    let slot = g.index(&items, 1).unwrap();
    g.assign(&slot, "replaced").unwrap();
    g.ret(slot).unwrap();
    g.finish().unwrap();

    let mut vm = m.finalize(&mut VmSink).unwrap();
    let result = vm.call_static("App", "run", vec![]).unwrap();
    assert!(matches!(result, Value::Str(s) if *s == "replaced"));
}
