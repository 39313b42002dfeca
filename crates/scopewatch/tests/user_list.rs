//! A user directory wired the way a page of bound views would be: a list
//! with show/hide toggles, one child scope per row, and click handlers that
//! evaluate expressions against the row.

use std::cell::RefCell;
use std::rc::Rc;

use scopewatch::prelude::*;
use serde_json::json;

/// What the "rendered page" currently shows.
#[derive(Default)]
struct Page {
    list_visible: bool,
    empty_message_visible: bool,
    rows: Vec<Row>,
    detail: Option<String>,
}

struct Row {
    scope: Scope,
    name: String,
    child: bool,
}

struct App {
    app: Scope,
    list: Scope,
    show: Scope,
    page: Rc<RefCell<Page>>,
}

fn build() -> App {
    let app = scopewatch::generate();
    let list = app.generate();
    let show = app.generate();
    let page = Rc::new(RefCell::new(Page::default()));

    app.set(
        "MODE",
        json!({"NONE": "none", "SHOW": "show", "NEW": "new", "EDIT": "edit"}),
    );
    app.set("mode", "none");

    let (mode_target, show_target) = (app.clone(), show.clone());
    app.set(
        "showUser",
        Value::function(move |args| {
            let show_mode = mode_target.eval("MODE.SHOW");
            mode_target.set("mode", show_mode);
            show_target.set("user", args.first().cloned().unwrap_or_default());
            Value::Undefined
        }),
    );

    let sink = Rc::clone(&page);
    list.watch("!!users.length", move |new, _| {
        sink.borrow_mut().list_visible = new.is_truthy();
    });
    let sink = Rc::clone(&page);
    list.watch("!!users.length", move |new, _| {
        sink.borrow_mut().empty_message_visible = !new.is_truthy();
    });

    let sink = Rc::clone(&page);
    show.watch("mode === MODE.SHOW ? user.name : undefined", move |new, _| {
        sink.borrow_mut().detail = new.as_str().map(str::to_owned);
    });

    // One child scope per row; rows are rebuilt whenever the list changes.
    let sink = Rc::clone(&page);
    let owner = list.clone();
    list.watch_collection("users", move |users, _| {
        let old_rows = std::mem::take(&mut sink.borrow_mut().rows);
        for row in old_rows {
            row.scope.destroy();
        }
        let Some(users) = users.as_array() else {
            return;
        };
        for user in users.to_vec() {
            let scope = owner.generate();
            scope.set("user", user);
            let index = sink.borrow().rows.len();
            sink.borrow_mut().rows.push(Row {
                scope: scope.clone(),
                name: String::new(),
                child: false,
            });
            let cell = Rc::clone(&sink);
            scope.watch("user.name", move |new, _| {
                cell.borrow_mut().rows[index].name = new.to_string();
            });
            let cell = Rc::clone(&sink);
            scope.watch("user.age < 20", move |new, _| {
                cell.borrow_mut().rows[index].child = new.is_truthy();
            });
        }
    });

    App {
        app,
        list,
        show,
        page,
    }
}

fn users() -> Value {
    Value::from(json!([
        {"id": 1, "name": "Taro Yamada", "age": 19},
        {"id": 2, "name": "Hanako Sato", "age": 34},
    ]))
}

#[test]
fn empty_list_shows_the_message() {
    let app = build();
    scopewatch::apply();

    let page = app.page.borrow();
    assert!(!page.list_visible);
    assert!(page.empty_message_visible);
    assert!(page.rows.is_empty());
    assert_eq!(page.detail, None);
}

#[test]
fn rows_render_on_the_pass_after_they_are_generated() {
    let app = build();
    app.list.set("users", users());

    scopewatch::apply();
    assert!(app.page.borrow().list_visible);
    assert_eq!(app.page.borrow().rows.len(), 2);
    assert_eq!(app.page.borrow().rows[0].name, "");

    scopewatch::apply();
    let page = app.page.borrow();
    let names: Vec<_> = page.rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["Taro Yamada", "Hanako Sato"]);
    assert!(page.rows[0].child);
    assert!(!page.rows[1].child);
}

#[test]
fn clicking_a_row_shows_its_user() {
    let app = build();
    app.list.set("users", users());
    scopewatch::apply();
    scopewatch::apply();

    let second = app.page.borrow().rows[1].scope.clone();
    second.eval("showUser(user)");
    scopewatch::apply();

    assert_eq!(app.app.get("mode"), Value::from("show"));
    assert_eq!(app.page.borrow().detail.as_deref(), Some("Hanako Sato"));
    assert!(app.show.has_own("user"));
}

#[test]
fn replacing_the_list_destroys_old_rows() {
    let app = build();
    app.list.set("users", users());
    scopewatch::apply();
    let old: Vec<Scope> = app.page.borrow().rows.iter().map(|r| r.scope.clone()).collect();

    app.list.set("users", Value::from(json!([{"id": 3, "name": "Jiro", "age": 8}])));
    scopewatch::apply();

    assert!(old.iter().all(Scope::is_destroyed));
    assert_eq!(app.list.children().len(), 1);
    scopewatch::apply();
    assert_eq!(app.page.borrow().rows[0].name, "Jiro");
    assert!(app.page.borrow().rows[0].child);
}

#[test]
fn in_place_mutation_is_picked_up_by_the_collection_watcher() {
    let app = build();
    let list = users();
    app.list.set("users", list.clone());
    scopewatch::apply();

    list.as_array()
        .unwrap()
        .push(Value::from(json!({"id": 3, "name": "Jiro", "age": 8})));
    scopewatch::apply();
    assert_eq!(app.page.borrow().rows.len(), 3);
}

#[test]
fn tearing_down_the_app_notifies_rows() {
    let app = build();
    app.list.set("users", users());
    scopewatch::apply();

    let torn_down = Rc::new(RefCell::new(0));
    for row in app.page.borrow().rows.iter() {
        let count = Rc::clone(&torn_down);
        row.scope
            .on(DESTROY_EVENT, move |_: &[Value]| *count.borrow_mut() += 1);
    }

    app.app.destroy();
    assert_eq!(*torn_down.borrow(), 2);
    assert!(app.list.is_destroyed());
    assert_eq!(scopewatch::apply(), 0);
}
