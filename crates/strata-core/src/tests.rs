use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::executor::LocalPool;
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use futures::FutureExt;
use proptest::prelude::*;
use serde_json::json;

use crate::*;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn stmts_action(source: &str, stmts: Vec<Stmt>) -> ActionSource {
    ActionSource::statements(source, stmts)
}

fn assign(name: &str, value: Expr) -> Stmt {
    Stmt::expr(Expr::assign(Expr::ident(name), value))
}

fn add(name: &str, n: i32) -> Expr {
    Expr::binary(BinaryOp::Add, Expr::ident(name), Expr::lit(n))
}

fn compose_root(root: &Rc<Container>) {
    root.compose(Rc::default(), Rc::default()).unwrap();
}

/// Runs `fut` on a local pool, returning the pool so the test can keep
/// driving it, and a slot receiving the output.
fn spawn<T: 'static>(
    pool: &LocalPool,
    fut: LocalBoxFuture<'static, T>,
) -> Rc<RefCell<Option<T>>> {
    let out = Rc::new(RefCell::new(None));
    let slot = out.clone();
    pool.spawner()
        .spawn_local(async move {
            *slot.borrow_mut() = Some(fut.await);
        })
        .unwrap();
    out
}

#[test]
fn local_vars_win_over_used_parent_state() {
    let engine = Rc::new(Engine::default());
    let root = Container::root(engine, "root");
    root.define(&ComponentDef::new("App").var("count", Binding::literal(1)));
    let parent = root.compose(Rc::default(), Rc::default()).unwrap();

    let child = Container::child(&root, "panel");
    child.define(
        &ComponentDef::new("Panel")
            .uses(&["count"])
            .var("count", Binding::expr("10", Expr::lit(10))),
    );
    let state = child.compose(parent, Rc::default()).unwrap();
    assert_eq!(state[&StateKey::named("count")], Value::from(10));
}

#[test]
fn empty_uses_isolates_from_parent_but_not_routing() {
    let root = Container::root(Rc::new(Engine::default()), "root");
    root.define(&ComponentDef::new("App").var("secret", Binding::literal("s")));
    let parent = root.compose(Rc::default(), Rc::default()).unwrap();

    let child = Container::child(&root, "isolated");
    child.define(&ComponentDef::new("Panel").uses(&[]));
    let routing: StateMap = [(StateKey::named("$pathname"), Value::from("/a"))]
        .into_iter()
        .collect();
    let state = child.compose(parent, Rc::new(routing)).unwrap();
    assert!(!state.contains_key(&StateKey::named("secret")));
    assert_eq!(state[&StateKey::named("$pathname")], Value::from("/a"));
}

struct CountingEvaluator {
    calls: Cell<usize>,
}

impl BindingEvaluator for CountingEvaluator {
    fn evaluate(&self, binding: &Binding, scope: &Rc<StateMap>) -> Result<Value, EvalError> {
        self.calls.set(self.calls.get() + 1);
        InterpreterEvaluator.evaluate(binding, scope)
    }
}

#[test]
fn unchanged_dependencies_are_not_reevaluated() {
    let counter = Rc::new(CountingEvaluator { calls: Cell::new(0) });
    let engine = Rc::new(Engine::default().with_evaluator(counter.clone()));
    let root = Container::root(engine, "root");
    root.define(
        &ComponentDef::new("App")
            .var("items", Binding::literal(json!([1, 2, 3])))
            .var("other", Binding::literal(0))
            .var(
                "size",
                Binding::expr("items.length", Expr::member(Expr::ident("items"), "length")),
            ),
    );
    compose_root(&root);
    let after_first = counter.calls.get();
    assert_eq!(after_first, 1);

    // an unrelated write leaves `items` the same allocation
    root.dispatch(ContainerAction::StatePartChanged {
        root: "other".into(),
        path: Path::new(),
        value: Value::from(5),
        kind: ChangeKind::Set,
        declared_shape: None,
    })
    .unwrap();
    compose_root(&root);
    assert_eq!(counter.calls.get(), after_first);
    assert_eq!(root.get("other"), Value::from(5));

    root.dispatch(ContainerAction::StatePartChanged {
        root: "items".into(),
        path: Path::new(),
        value: Value::from(json!([1])),
        kind: ChangeKind::Set,
        declared_shape: None,
    })
    .unwrap();
    compose_root(&root);
    assert_eq!(counter.calls.get(), after_first + 1);
    assert_eq!(root.get("size"), Value::from(1));
}

#[test]
fn writes_within_one_statement_commit_once() {
    init_logs();
    let scheduler = Rc::new(QueuedScheduler::default());
    let engine = Rc::new(Engine::new(scheduler.clone()));
    let diagnostics = engine.diagnostics.clone();
    let root = Container::root(engine, "root");
    root.define(&ComponentDef::new("App").var("x", Binding::literal(0)));
    compose_root(&root);

    let handler = root
        .lookup_action(
            Some(&stmts_action(
                "{ x = 1; x = 2; }",
                vec![Stmt::Block(vec![
                    assign("x", Expr::lit(1)),
                    assign("x", Expr::lit(2)),
                ])],
            )),
            &ComponentUid::named("btn"),
            &LookupOptions::event("click"),
        )
        .unwrap();

    let mut pool = LocalPool::new();
    let out = spawn(&pool, handler(vec![]));
    pool.run_until_stalled();
    assert_eq!(scheduler.pending(), 1);
    assert!(root.state().get_named("x").is_none());

    scheduler.flush();
    pool.run_until_stalled();
    assert!(matches!(out.borrow().as_ref(), Some(Ok(_))));
    let snapshot = diagnostics.snapshot();
    assert_eq!(snapshot.commits, 1);
    assert_eq!(snapshot.committed_changes, 1);
    assert_eq!(root.get("x"), Value::from(2));
}

#[test]
fn each_top_level_statement_is_its_own_commit() {
    let engine = Rc::new(Engine::default());
    let diagnostics = engine.diagnostics.clone();
    let root = Container::root(engine, "root");
    root.define(&ComponentDef::new("App").var("x", Binding::literal(0)));
    compose_root(&root);

    let handler = root
        .lookup_action(
            Some(&stmts_action(
                "x++; x++; x++",
                vec![
                    Stmt::expr(Expr::increment(Expr::ident("x"))),
                    Stmt::expr(Expr::increment(Expr::ident("x"))),
                    Stmt::expr(Expr::increment(Expr::ident("x"))),
                ],
            )),
            &ComponentUid::anonymous(),
            &LookupOptions::default(),
        )
        .unwrap();
    pollster::block_on(handler(vec![])).unwrap();
    assert_eq!(root.get("x"), Value::from(3));
    assert_eq!(diagnostics.commits(), 3);
}

#[test]
fn loop_iterations_commit_and_see_fresh_state() {
    let engine = Rc::new(Engine::default());
    let diagnostics = engine.diagnostics.clone();
    let root = Container::root(engine, "root");
    root.define(
        &ComponentDef::new("App")
            .var("log", Binding::literal(json!([])))
            .var(
                "size",
                Binding::expr("log.length", Expr::member(Expr::ident("log"), "length")),
            ),
    );
    compose_root(&root);

    // for (const n of [1, 2, 3]) log.push(size);
    let body = vec![Stmt::for_of(
        "n",
        Expr::array(vec![Expr::lit(1), Expr::lit(2), Expr::lit(3)]),
        vec![Stmt::expr(Expr::call(
            Expr::member(Expr::ident("log"), "push"),
            vec![Expr::ident("size")],
        ))],
    )];
    let handler = root
        .lookup_action(
            Some(&stmts_action("for (const n of [1,2,3]) log.push(size)", body)),
            &ComponentUid::anonymous(),
            &LookupOptions::default(),
        )
        .unwrap();
    pollster::block_on(handler(vec![])).unwrap();
    // `size` is recomposed after every iteration's commit
    assert_eq!(root.get("log").to_json(), json!([0, 1, 2]));
    assert_eq!(diagnostics.commits(), 3);
}

#[test]
fn convention_handler_is_found_by_uid_and_event() {
    let root = Container::root(Rc::new(Engine::default()), "root");
    root.define(
        &ComponentDef::new("App")
            .var("clicks", Binding::literal(0))
            .function(
                "btn_onClick",
                Binding::expr(
                    "() => { clicks = clicks + 1 }",
                    Expr::arrow_block(&[], vec![assign("clicks", add("clicks", 1))]),
                ),
            ),
    );
    compose_root(&root);

    let btn = ComponentUid::named("btn");
    assert!(root
        .lookup_action(None, &btn, &LookupOptions::event("hover"))
        .is_none());
    let handler = root
        .lookup_action(None, &btn, &LookupOptions::event("click"))
        .unwrap();
    pollster::block_on(handler(vec![])).unwrap();
    pollster::block_on(handler(vec![])).unwrap();
    assert_eq!(root.get("clicks"), Value::from(2));
}

#[test]
fn handlers_are_cached_unless_ephemeral() {
    let root = Container::root(Rc::new(Engine::default()), "root");
    compose_root(&root);
    let source = stmts_action("noop", vec![Stmt::Empty]);
    let owner = ComponentUid::named("a");
    let first = root
        .lookup_action(Some(&source), &owner, &LookupOptions::event("click"))
        .unwrap();
    let second = root
        .lookup_action(Some(&source), &owner, &LookupOptions::event("click"))
        .unwrap();
    assert!(Rc::ptr_eq(&first, &second));
    let third = root
        .lookup_action(
            Some(&source),
            &owner,
            &LookupOptions::event("click").ephemeral(),
        )
        .unwrap();
    assert!(!Rc::ptr_eq(&first, &third));
}

#[test]
fn handler_params_and_lifecycle_flags() {
    let root = Container::root(Rc::new(Engine::default()), "root");
    root.define(&ComponentDef::new("App").var("got", Binding::literal(Value::Null)));
    compose_root(&root);
    let owner = ComponentUid::named("grid");
    let handler = root
        .lookup_action(
            Some(&stmts_action(
                "got = $param + $params.length",
                vec![assign(
                    "got",
                    Expr::binary(
                        BinaryOp::Add,
                        Expr::ident("$param"),
                        Expr::member(Expr::ident("$params"), "length"),
                    ),
                )],
            )),
            &owner,
            &LookupOptions::event("select"),
        )
        .unwrap();
    pollster::block_on(handler(vec![Value::from(40), Value::from(0)])).unwrap();
    assert_eq!(root.get("got"), Value::from(42));
    let flags = root.state().get(&StateKey::Identity(owner)).cloned().unwrap();
    assert_eq!(flags.get("selectInProgress"), Value::Bool(false));
}

#[test]
fn loader_results_are_indexed_by_id() {
    let root = Container::root(Rc::new(Engine::default()), "root");
    root.define(
        &ComponentDef::new("App").var(
            "first",
            Binding::expr(
                "users.byId.a.name",
                Expr::member(
                    Expr::member(Expr::member(Expr::ident("users"), "byId"), "a"),
                    "name",
                ),
            ),
        ),
    );
    let users = root.uid_for("users", Some("users"));
    root.dispatch(ContainerAction::LoaderLoaded {
        uid: users.clone(),
        data: Value::from(json!([{ "$id": "a", "name": "Ada" }, { "$id": "b", "name": "Bo" }])),
        page_info: None,
    })
    .unwrap();
    compose_root(&root);
    let entry = root.state().get(&StateKey::Identity(users)).cloned().unwrap();
    assert_eq!(entry.get("loaded"), Value::Bool(true));
    assert_eq!(
        entry.get("byId").to_json(),
        json!({ "a": { "$id": "a", "name": "Ada" }, "b": { "$id": "b", "name": "Bo" } })
    );
    assert_eq!(root.get("first"), Value::from("Ada"));
}

#[test]
fn read_only_write_aborts_without_partial_commit() {
    let engine = Rc::new(Engine::default());
    let diagnostics = engine.diagnostics.clone();
    let root = Container::root(engine, "root");
    root.define(
        &ComponentDef::new("Row")
            .context_var("$item", json!({ "a": 1 }))
            .var("x", Binding::literal(0))
            .var("y", Binding::literal(0)),
    );
    compose_root(&root);

    let owner = ComponentUid::named("row");
    let handler = root
        .lookup_action(
            Some(&stmts_action(
                "x = 1; { y = 2; $item.a = 3; }",
                vec![
                    assign("x", Expr::lit(1)),
                    Stmt::Block(vec![
                        assign("y", Expr::lit(2)),
                        Stmt::expr(Expr::assign(
                            Expr::member(Expr::ident("$item"), "a"),
                            Expr::lit(3),
                        )),
                    ]),
                ],
            )),
            &owner,
            &LookupOptions::event("click"),
        )
        .unwrap();
    let err = pollster::block_on(handler(vec![])).unwrap_err();
    assert!(matches!(err, ExecError::ReadOnly(ref name) if name == "$item"));

    assert_eq!(root.get("x"), Value::from(1));
    assert_eq!(root.state().get_named("y"), None);
    assert_eq!(root.get("$item").to_json(), json!({ "a": 1 }));
    assert_eq!(diagnostics.handler_errors().len(), 1);
    let flags = root.state().get(&StateKey::Identity(owner)).cloned().unwrap();
    assert_eq!(flags.get("clickInProgress"), Value::Bool(false));
    assert!(flags.get("clickError").as_str().is_some());
}

#[test]
fn writes_bubble_to_the_declaring_ancestor() {
    let root = Container::root(Rc::new(Engine::default()), "root");
    root.define(
        &ComponentDef::new("App")
            .var("settings", Binding::literal(json!({ "theme": "light", "size": 1 }))),
    );
    let parent = root.compose(Rc::default(), Rc::default()).unwrap();
    let child = Container::child(&root, "form");
    child.define(&ComponentDef::new("Form").var("draft", Binding::literal("")));
    child.compose(parent, Rc::default()).unwrap();

    let handler = child
        .lookup_action(
            Some(&stmts_action(
                "settings.theme = 'dark'; scratch = 1",
                vec![
                    Stmt::expr(Expr::assign(
                        Expr::member(Expr::ident("settings"), "theme"),
                        Expr::lit("dark"),
                    )),
                    assign("scratch", Expr::lit(1)),
                ],
            )),
            &ComponentUid::anonymous(),
            &LookupOptions::default(),
        )
        .unwrap();
    pollster::block_on(handler(vec![])).unwrap();

    assert!(child.state().get_named("settings").is_none());
    // the partial write kept the sibling member
    assert_eq!(
        root.state().get_named("settings").unwrap().to_json(),
        json!({ "theme": "dark", "size": 1 })
    );
    // undeclared roots land in the outermost container
    assert_eq!(root.state().get_named("scratch"), Some(&Value::from(1)));
}

#[test]
fn bubbling_into_an_unmounted_ancestor_still_applies() {
    let root = Container::root(Rc::new(Engine::default()), "root");
    root.define(&ComponentDef::new("App").var("n", Binding::literal(0)));
    let parent = root.compose(Rc::default(), Rc::default()).unwrap();
    let child = Container::child(&root, "leaf");
    child.define(&ComponentDef::new("Leaf").as_container());
    child.compose(parent, Rc::default()).unwrap();

    root.unmount();
    let handler = child
        .lookup_action(
            Some(&stmts_action("n = 5", vec![assign("n", Expr::lit(5))])),
            &ComponentUid::anonymous(),
            &LookupOptions::default(),
        )
        .unwrap();
    pollster::block_on(handler(vec![])).unwrap();
    assert_eq!(root.state().get_named("n"), Some(&Value::from(5)));
}

#[test]
fn unmount_releases_suspended_handlers() {
    let scheduler = Rc::new(QueuedScheduler::default());
    let root = Container::root(Rc::new(Engine::new(scheduler.clone())), "root");
    root.define(&ComponentDef::new("App").var("x", Binding::literal(0)));
    compose_root(&root);
    let handler = root
        .lookup_action(
            Some(&stmts_action(
                "x = 1; x = 2",
                vec![assign("x", Expr::lit(1)), assign("x", Expr::lit(2))],
            )),
            &ComponentUid::anonymous(),
            &LookupOptions::default(),
        )
        .unwrap();

    let mut pool = LocalPool::new();
    let out = spawn(&pool, handler(vec![]));
    pool.run_until_stalled();
    assert_eq!(root.pending_suspensions(), 1);
    assert!(out.borrow().is_none());

    root.unmount();
    pool.run_until_stalled();
    assert_eq!(root.pending_suspensions(), 0);
    // the remaining statement ran against an unmounted container and applied
    // its write directly
    assert!(matches!(out.borrow().as_ref(), Some(Ok(_))));
    assert_eq!(root.state().get_named("x"), Some(&Value::from(2)));
}

struct CountingScheduler {
    yields: Cell<usize>,
}

impl Scheduler for CountingScheduler {
    fn yield_low_priority(&self) -> LocalBoxFuture<'static, ()> {
        self.yields.set(self.yields.get() + 1);
        YieldNow::default().boxed_local()
    }

    fn commit(&self, patch: Patch) -> LocalBoxFuture<'static, Result<(), StateError>> {
        let result = patch.apply();
        async move { result }.boxed_local()
    }
}

#[test]
fn idle_checkpoints_yield_periodically() {
    let scheduler = Rc::new(CountingScheduler { yields: Cell::new(0) });
    let engine = Engine::new(scheduler.clone())
        .with_config(EngineConfig::default().with_yield_every(3));
    let root = Container::root(Rc::new(engine), "root");
    compose_root(&root);

    // let i = 0; while (i < 7) i++;  -> seven idle iterations plus two statements
    let body = vec![
        Stmt::let_("i", Expr::lit(0)),
        Stmt::while_(
            Expr::binary(BinaryOp::Lt, Expr::ident("i"), Expr::lit(7)),
            vec![Stmt::expr(Expr::increment(Expr::ident("i")))],
        ),
    ];
    let handler = root
        .lookup_action(
            Some(&stmts_action("count", body)),
            &ComponentUid::anonymous(),
            &LookupOptions::default(),
        )
        .unwrap();
    pollster::block_on(handler(vec![])).unwrap();
    assert_eq!(scheduler.yields.get(), 3);
}

#[test]
fn nested_loops_checkpoint_every_iteration() {
    let scheduler = Rc::new(CountingScheduler { yields: Cell::new(0) });
    let engine = Engine::new(scheduler.clone())
        .with_config(EngineConfig::default().with_yield_every(3));
    let root = Container::root(Rc::new(engine), "root");
    root.define(&ComponentDef::new("App").var("hits", Binding::literal(0)));
    compose_root(&root);

    // if (true) { let i = 0; while (i < 30) i++; }  -> one statement plus thirty idle iterations
    let idle = vec![Stmt::if_(
        Expr::lit(true),
        vec![
            Stmt::let_("i", Expr::lit(0)),
            Stmt::while_(
                Expr::binary(BinaryOp::Lt, Expr::ident("i"), Expr::lit(30)),
                vec![Stmt::expr(Expr::increment(Expr::ident("i")))],
            ),
        ],
        None,
    )];
    let handler = root
        .lookup_action(
            Some(&stmts_action("idle", idle)),
            &ComponentUid::anonymous(),
            &LookupOptions::default(),
        )
        .unwrap();
    pollster::block_on(handler(vec![])).unwrap();
    assert_eq!(scheduler.yields.get(), 31 / 3);

    // { for (const n of [1, 2, 3]) { if (n > 0) hits++; } }  -> a commit per iteration
    let commits_before = root.engine().diagnostics.commits();
    let writes = vec![Stmt::Block(vec![Stmt::for_of(
        "n",
        Expr::array(vec![Expr::lit(1), Expr::lit(2), Expr::lit(3)]),
        vec![Stmt::if_(
            Expr::binary(BinaryOp::Gt, Expr::ident("n"), Expr::lit(0)),
            vec![Stmt::expr(Expr::increment(Expr::ident("hits")))],
            None,
        )],
    )])];
    let handler = root
        .lookup_action(
            Some(&stmts_action("writes", writes)),
            &ComponentUid::anonymous(),
            &LookupOptions::default(),
        )
        .unwrap();
    pollster::block_on(handler(vec![])).unwrap();
    assert_eq!(root.get("hits"), Value::from(3));
    assert_eq!(root.engine().diagnostics.commits() - commits_before, 3);
}

#[test]
fn far_out_of_range_index_writes_fail_the_handler() {
    let root = Container::root(Rc::new(Engine::default()), "root");
    root.define(&ComponentDef::new("App").var("a", Binding::literal(json!([]))));
    compose_root(&root);

    for index in [1e300, 1e9] {
        let write = vec![Stmt::expr(Expr::assign(
            Expr::index(Expr::ident("a"), Expr::lit(index)),
            Expr::lit(1),
        ))];
        let handler = root
            .lookup_action(
                Some(&stmts_action(&format!("a[{index}] = 1"), write)),
                &ComponentUid::anonymous(),
                &LookupOptions::default(),
            )
            .unwrap();
        assert!(pollster::block_on(handler(vec![])).is_err());
    }
    assert_eq!(root.get("a").to_json(), json!([]));
    assert_eq!(root.engine().diagnostics.handler_errors().len(), 2);
}

#[test]
fn context_vars_lose_to_declared_locals() {
    let root = Container::root(Rc::new(Engine::default()), "root");
    root.define(
        &ComponentDef::new("App")
            .context_var("x", 1)
            .context_var("y", 2)
            .var("x", Binding::literal(10)),
    );
    compose_root(&root);
    assert_eq!(root.get("x"), Value::from(10));
    assert_eq!(root.get("y"), Value::from(2));

    root.dispatch(ContainerAction::StatePartChanged {
        root: "x".into(),
        path: Path::new(),
        value: Value::from(20),
        kind: ChangeKind::Set,
        declared_shape: None,
    })
    .unwrap();
    compose_root(&root);
    assert_eq!(root.get("x"), Value::from(20));
}

#[test]
fn sync_callbacks_require_arrows_and_do_not_commit() {
    let root = Container::root(Rc::new(Engine::default()), "root");
    root.define(&ComponentDef::new("App").var("base", Binding::literal(10)));
    compose_root(&root);

    let arrow = ActionSource::expr(
        "(n) => base + n",
        Expr::arrow(&["n"], Expr::binary(BinaryOp::Add, Expr::ident("base"), Expr::ident("n"))),
    );
    let callback = root.lookup_sync_callback(&arrow).unwrap();
    assert_eq!(callback(vec![Value::from(5)]).unwrap(), Value::from(15));

    let writes = ActionSource::expr(
        "() => { base = 0; return base }",
        Expr::arrow_block(&[], vec![assign("base", Expr::lit(0)), Stmt::ret(Expr::ident("base"))]),
    );
    let callback = root.lookup_sync_callback(&writes).unwrap();
    assert_eq!(callback(vec![]).unwrap(), Value::from(0));
    assert_eq!(root.get("base"), Value::from(10));

    let statements = stmts_action("base = 1", vec![assign("base", Expr::lit(1))]);
    assert!(matches!(
        root.lookup_sync_callback(&statements),
        Err(ActionError::ArrowRequired(src)) if src == "base = 1"
    ));

    assert!(root.engine().diagnostics.handler_errors().is_empty());
    let failing = ActionSource::expr(
        "() => missing.x",
        Expr::arrow(&[], Expr::member(Expr::ident("missing"), "x")),
    );
    let callback = root.lookup_sync_callback(&failing).unwrap();
    assert!(callback(vec![]).is_err());
    let errors = root.engine().diagnostics.handler_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].owner, "root");
    assert!(errors[0].message.contains('x'));
}

#[test]
fn component_api_registration_merges() {
    let root = Container::root(Rc::new(Engine::default()), "root");
    let dialog = root.uid_for("dialog", Some("dialog"));
    let open = Value::native("open", |_| Ok(Value::Bool(true)));
    let close = Value::native("close", |_| Ok(Value::Bool(false)));
    root.register_component_api(&dialog, Object::from_iter([("open".to_string(), open)]));
    root.register_component_api(&dialog, Object::from_iter([("close".to_string(), close)]));
    compose_root(&root);
    let api = root.get("dialog");
    assert!(api.get("open").as_function().is_some());
    assert!(api.get("close").as_function().is_some());
}

#[test]
fn second_pass_binding_errors_surface_from_compose() {
    let root = Container::root(Rc::new(Engine::default()), "root");
    root.define(&ComponentDef::new("App").var(
        "bad",
        Binding::expr("nothing.here", Expr::member(Expr::member(Expr::ident("nothing"), "x"), "here")),
    ));
    let err = root.compose(Rc::default(), Rc::default()).unwrap_err();
    assert!(err.to_string().contains("nothing.here"));
}

fn json_value() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i32>().prop_map(serde_json::Value::from),
        "[a-z]{0,8}".prop_map(serde_json::Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn literal_bindings_resolve_to_themselves(v in json_value()) {
        let root = Container::root(Rc::new(Engine::default()), "root");
        root.define(&ComponentDef::new("App").var("lit", Binding::literal(v.clone())));
        compose_root(&root);
        prop_assert_eq!(root.get("lit").to_json(), v);
        prop_assert_eq!(root.resolver().evaluations(), 0);
    }
}
