use std::cell::{Cell, RefCell};
use std::rc::Rc;

use scopewatch_expr::{Dialect, Object, Value};
use scopewatch_runtime::{DESTROY_EVENT, RuntimeConfig, Scope, WatchSource, resolve};
use serde_json::json;

type Calls = Rc<RefCell<Vec<(Value, Value)>>>;

fn record(scope: &Scope, source: &str) -> Calls {
    let calls: Calls = Rc::default();
    let sink = Rc::clone(&calls);
    scope.watch(source, move |new, old| {
        sink.borrow_mut().push((new.clone(), old.clone()));
    });
    calls
}

#[test]
fn destroyed_subtree_never_fires() {
    let root = Scope::detached();
    let doomed = root.generate();
    let leaf = doomed.generate();
    let fired = Rc::new(Cell::new(0));
    for scope in [&doomed, &leaf] {
        let count = Rc::clone(&fired);
        scope.watch(WatchSource::getter(|| Value::Null), move |_, _| {
            count.set(count.get() + 1);
        });
    }

    doomed.destroy();
    root.apply();
    doomed.apply();
    leaf.apply();
    assert_eq!(fired.get(), 0);
}

#[test]
fn scalar_watcher_reports_new_and_old() {
    let scope = Scope::detached();
    scope.set("count", 1);
    let calls = record(&scope, "count");

    scope.apply();
    scope.apply();
    scope.set("count", 2);
    scope.apply();
    scope.apply();

    assert_eq!(
        *calls.borrow(),
        vec![
            (Value::from(1), Value::Undefined),
            (Value::from(2), Value::from(1)),
        ]
    );
}

#[test]
fn collection_watcher_is_shallow() {
    let scope = Scope::detached();
    scope.set("obj", json!({"a": {"b": 1}, "c": 1}));
    let fired = Rc::new(Cell::new(0));
    let count = Rc::clone(&fired);
    scope.watch_collection("obj", move |_, _| count.set(count.get() + 1));
    scope.apply();
    assert_eq!(fired.get(), 1);

    let obj = scope.get("obj");
    let members = obj.as_object().unwrap();
    members.get("a").unwrap().as_object().unwrap().set("b", 2);
    scope.apply();
    assert_eq!(fired.get(), 1, "nested change is not seen");

    members.set("a", Object::new());
    scope.apply();
    assert_eq!(fired.get(), 2, "replacing the nested object itself");

    members.set("c", 2);
    scope.apply();
    assert_eq!(fired.get(), 3, "replacement");

    members.set("d", 1);
    scope.apply();
    assert_eq!(fired.get(), 4, "addition");

    members.remove("c");
    scope.apply();
    assert_eq!(fired.get(), 5, "removal");
}

#[test]
fn destroy_marks_every_descendant_once() {
    let root = Scope::detached();
    let target = root.generate();
    let mut descendants = vec![target.generate(), target.generate()];
    descendants.push(descendants[0].generate());
    let broadcasts = Rc::new(Cell::new(0));
    let count = Rc::clone(&broadcasts);
    target.on(DESTROY_EVENT, move |_: &[Value]| count.set(count.get() + 1));

    target.destroy();
    target.destroy();

    assert!(target.is_destroyed());
    assert!(descendants.iter().all(Scope::is_destroyed));
    assert!(root.children().is_empty());
    assert!(!root.is_destroyed());
    assert_eq!(broadcasts.get(), 1);
}

#[test]
fn events_reach_exactly_the_expected_scopes() {
    let root = Scope::detached();
    let s = root.generate();
    let sibling = root.generate();
    let child = s.generate();
    let grandchild = child.generate();
    let hits: Rc<RefCell<Vec<&'static str>>> = Rc::default();
    for (scope, label) in [
        (&root, "root"),
        (&s, "s"),
        (&sibling, "sibling"),
        (&child, "child"),
        (&grandchild, "grandchild"),
    ] {
        let sink = Rc::clone(&hits);
        scope.on("x", move |_: &[Value]| sink.borrow_mut().push(label));
    }

    s.broadcast("x", &[]);
    assert_eq!(*hits.borrow(), vec!["s", "child", "grandchild"]);

    hits.borrow_mut().clear();
    grandchild.emit("x", &[]);
    assert_eq!(*hits.borrow(), vec!["grandchild", "child", "s", "root"]);

    hits.borrow_mut().clear();
    s.emit("y", &[]);
    root.broadcast("y", &[]);
    assert!(hits.borrow().is_empty());
}

#[test]
fn age_expression_against_models() {
    let scope = Scope::detached();
    assert_eq!(scope.eval("user.age < 20"), Value::Undefined);
    assert!(!scope.eval("user.age < 20").is_truthy());
    scope.set("user", json!({"age": 15}));
    assert_eq!(scope.eval("user.age < 20"), Value::Bool(true));
    scope.set("user", json!({"age": 25}));
    assert_eq!(scope.eval("user.age < 20"), Value::Bool(false));
}

#[test]
fn literal_and_function_sources() {
    let scope = Scope::detached();
    let literal = resolve(WatchSource::from(42), &scope, Dialect::Strict);
    scope.set("anything", 1);
    assert_eq!(literal(), Value::from(42));

    let f: scopewatch_runtime::Getter = Rc::new(|| Value::from("f"));
    let resolved = resolve(f.clone().into(), &scope, Dialect::Strict);
    assert!(Rc::ptr_eq(&f, &resolved));
}

#[test]
fn values_flow_down_never_up() {
    let parent = Scope::detached();
    parent.set("shared", "yes");
    let child = parent.generate();
    assert_eq!(child.get("shared"), Value::from("yes"));

    child.set("local", 1);
    assert_eq!(parent.get("local"), Value::Undefined);
    assert_eq!(parent.parent(), None);
}

#[test]
fn broken_binding_does_not_abort_digest() {
    let scope = Scope::detached();
    let broken = record(&scope, "user.name.first");
    let healthy = record(&scope, "ok");
    scope.set("ok", true);

    scope.apply();
    assert_eq!(*broken.borrow(), vec![(Value::Undefined, Value::Undefined)]);
    assert_eq!(*healthy.borrow(), vec![(Value::Bool(true), Value::Undefined)]);
}

#[test]
fn compat_dialect_from_config() {
    RuntimeConfig::set_global(RuntimeConfig::default().with_dialect(Dialect::Compat));
    let scope = Scope::detached();
    scope.set("mode", "show");
    assert_eq!(scope.eval("mode === 'show'"), Value::Bool(false));
    assert_eq!(scope.eval("'show'"), Value::from("scope.show"));

    RuntimeConfig::set_global(RuntimeConfig::default());
    assert_eq!(scope.eval("mode === 'show'"), Value::Bool(true));
}

#[test]
fn root_helpers_share_the_thread_root() {
    let child = scopewatch_runtime::generate();
    assert_eq!(child.parent(), Some(Scope::root()));
    let calls = record(&child, "flag");
    Scope::root().set("flag", 1);
    assert_eq!(scopewatch_runtime::apply(), 1);
    assert_eq!(calls.borrow().len(), 1);

    Scope::root().destroy();
    assert!(child.is_destroyed());
    assert!(!Scope::root().is_destroyed());
    assert!(Scope::root().children().is_empty());
}
