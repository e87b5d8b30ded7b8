use super::*;

fn group(value: &str) -> GroupKey {
    GroupKey::try_new(value).unwrap()
}

fn entry(step: &Step, group: &str, order: i64) -> LedgerEntry {
    LedgerEntry {
        hash: step.hash().clone(),
        revert: step.revert().to_string(),
        group: group.to_string(),
        order,
        name: step.name().to_string(),
        origin: String::new(),
        applied_at_ms: 0,
    }
}

#[test]
fn group_key_validation() {
    assert_eq!(GroupKey::try_new("").unwrap_err(), GroupKeyError::Empty);
    assert_eq!(
        GroupKey::try_new("-users").unwrap_err(),
        GroupKeyError::InvalidFirstChar
    );
    assert_eq!(
        GroupKey::try_new("users schema").unwrap_err(),
        GroupKeyError::InvalidChar { ch: ' ', index: 5 }
    );
    assert_eq!(
        GroupKey::try_new("a".repeat(129)).unwrap_err(),
        GroupKeyError::TooLong
    );
    assert!(GroupKey::try_new("app/users:v2").is_ok());
}

#[test]
fn normalize_strips_comments_blank_lines_and_indentation() {
    let raw = "\n  -- users table\n  create table users (\n\n      id int\n  )  \n";
    assert_eq!(normalize_sql(raw), "create table users (\nid int\n)");
    assert_eq!(normalize_sql("  \n -- only a comment\n"), "");
}

#[test]
fn hash_ignores_whitespace_and_comment_lines() {
    let a = Step::new("create table t (\n  id int\n)");
    let b = Step::new("\n-- cosmetic edit\ncreate table t (\n        id int\n    )\n\n");
    assert_eq!(a.hash(), b.hash());
    assert_eq!(a.hash().as_str().len(), 64);
    assert!(
        a.hash()
            .as_str()
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    );

    let c = Step::new("create table t (\n  id bigint\n)");
    assert_ne!(a.hash(), c.hash());
}

#[test]
fn hash_depends_only_on_forward_sql() {
    let plain = Step::new("create table t (id int)");
    let decorated = Step::new("create table t (id int)")
        .with_name("make t")
        .with_revert("drop table t")
        .with_prerequisite("select 1")
        .with_origin("schema/t.rs");
    assert_eq!(plain.hash(), decorated.hash());
    assert_eq!(decorated.prerequisite(), Some("select 1"));
    assert_eq!(plain.prerequisite(), None);
}

#[test]
fn registry_names_unnamed_steps_by_index() {
    let mut registry = Registry::new();
    registry
        .register(
            group("core"),
            vec![
                Step::new("create table a (id int)").with_name("a"),
                Step::new("create table b (id int)"),
            ],
        )
        .unwrap();

    let series = registry.build_series(&[]).unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].steps()[0].name(), "a");
    assert_eq!(series[0].steps()[1].name(), "unnamed-1");
}

#[test]
fn registry_rejects_duplicate_and_empty_steps() {
    let mut registry = Registry::new();
    registry
        .register(group("one"), vec![Step::new("create table a (id int)")])
        .unwrap();

    let err = registry
        .register(
            group("two"),
            vec![Step::new("\n   create table a (id int)\n-- same statement\n")],
        )
        .unwrap_err();
    assert_eq!(err.message(), "step is already registered");
    let err = registry
        .register(group("two"), vec![Step::new("create table a (id int)")])
        .unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateStep { ref first_group, .. } if first_group == "one"));

    let err = registry
        .register(group("three"), vec![Step::new("-- nothing\n\n")])
        .unwrap_err();
    assert!(matches!(err, RegistryError::EmptyStep { .. }));

    // Failed registrations leave no trace.
    assert_eq!(registry.groups().len(), 1);
}

#[test]
fn registry_selects_groups_and_rejects_unknown_ones() {
    let mut registry = Registry::new();
    registry
        .register(group("one"), vec![Step::new("create table a (id int)")])
        .unwrap();
    registry
        .register(group("two"), vec![Step::new("create table b (id int)")])
        .unwrap();
    registry.register(group("one"), Vec::new()).unwrap();

    assert_eq!(registry.build_series(&[]).unwrap().len(), 3);
    let only_two = registry.build_series(&[group("two")]).unwrap();
    assert_eq!(only_two.len(), 1);
    assert_eq!(only_two[0].group().as_str(), "two");
    assert_eq!(registry.resolve_groups(&[]), vec![group("one"), group("two")]);

    assert_eq!(
        registry.build_series(&[group("three")]).unwrap_err(),
        RegistryError::UnknownGroup("three".to_string())
    );
}

#[test]
fn build_series_does_not_share_cursor_state() {
    let mut registry = Registry::new();
    registry
        .register(group("one"), vec![Step::new("create table a (id int)")])
        .unwrap();

    let mut first = registry.build_series(&[]).unwrap();
    first[0].advance();
    assert!(first[0].is_done());

    let second = registry.build_series(&[]).unwrap();
    assert_eq!(second[0].cursor(), 0);
}

#[test]
fn reconcile_stops_at_first_unrecorded_step() {
    let a = Step::new("create table a (id int)");
    let b = Step::new("create table b (id int)");
    let c = Step::new("create table c (id int)");
    let mut snapshot = LedgerSnapshot::from_entries(vec![entry(&a, "g", 1), entry(&c, "g", 2)]);

    let mut series = Series::new(group("g"), vec![a, b, c]);
    assert_eq!(series.reconcile(&mut snapshot), 1);
    assert_eq!(series.cursor(), 1);

    // `c` is recorded but sits behind the unrecorded `b`, so it is orphaned.
    let orphans = snapshot.into_orphans();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].order, 2);
}

#[test]
fn revert_boundary_is_minimum_orphan_order() {
    let a = Step::new("create table a (id int)");
    let b = Step::new("create table b (id int)");
    assert_eq!(revert_boundary(&[]), None);
    assert_eq!(
        revert_boundary(&[entry(&a, "g", 7), entry(&b, "g", 3)]),
        Some(3)
    );
}

#[test]
fn rewind_undoes_steps_at_or_after_boundary() {
    let a = Step::new("create table a (id int)");
    let b = Step::new("create table b (id int)");
    let c = Step::new("create table c (id int)");
    let mut snapshot = LedgerSnapshot::from_entries(vec![
        entry(&a, "g", 1),
        entry(&b, "g", 4),
        entry(&c, "g", 6),
    ]);

    let mut series = Series::new(group("g"), vec![a, b, c]);
    assert_eq!(series.reconcile(&mut snapshot), 3);
    assert!(series.is_done());

    let undone = series.rewind(4);
    assert_eq!(
        undone.iter().map(|e| e.order).collect::<Vec<_>>(),
        vec![6, 4]
    );
    assert_eq!(series.cursor(), 1);
}

#[test]
fn rewind_never_passes_unrecorded_steps() {
    let a = Step::new("create table a (id int)");
    let mut series = Series::new(group("g"), vec![a]);
    assert!(series.rewind(0).is_empty());
    assert_eq!(series.cursor(), 0);
}

#[test]
fn plan_orders_reverts_descending_across_series() {
    let users = Step::new("create table users (id int primary key)").with_revert("drop table users");
    let orders = Step::new("create table orders (user_id int references users(id))")
        .with_revert("drop table orders");
    let audit = Step::new("create table audit (id int)").with_revert("drop table audit");
    let snapshot = LedgerSnapshot::from_entries(vec![
        entry(&users, "accounts", 1),
        entry(&audit, "audit", 2),
        entry(&orders, "shop", 3),
    ]);

    // `users` changed shape; `orders` and `audit` were recorded after it.
    let new_users = Step::new("create table users (id int primary key, email text)");
    let mut series = vec![
        Series::new(group("accounts"), vec![new_users]),
        Series::new(group("audit"), vec![audit]),
        Series::new(group("shop"), vec![orders]),
    ];

    let plan = plan_reverts(&mut series, snapshot);
    assert_eq!(plan.boundary, Some(1));
    assert_eq!(
        plan.entries.iter().map(|e| e.order).collect::<Vec<_>>(),
        vec![3, 2, 1]
    );
    assert_eq!(plan.already_applied, 0);
    assert!(series.iter().all(|s| s.cursor() == 0));
}

#[test]
fn plan_keeps_entries_recorded_before_boundary() {
    let a = Step::new("create table a (id int)");
    let b = Step::new("create table b (id int)").with_revert("drop table b");
    let x = Step::new("create table x (id int)");
    let snapshot = LedgerSnapshot::from_entries(vec![
        entry(&x, "other", 1),
        entry(&a, "g", 2),
        entry(&b, "g", 3),
    ]);

    let c = Step::new("create table c (id int)");
    let mut series = vec![
        Series::new(group("other"), vec![x]),
        Series::new(group("g"), vec![a, c]),
    ];
    let plan = plan_reverts(&mut series, snapshot);

    assert_eq!(plan.boundary, Some(3));
    assert_eq!(plan.hashes(), vec![b.hash().clone()]);
    assert_eq!(plan.already_applied, 2);
    assert!(series[0].is_done());
    assert_eq!(series[1].cursor(), 1);
}

#[test]
fn plan_is_empty_when_ledger_matches() {
    let a = Step::new("create table a (id int)");
    let snapshot = LedgerSnapshot::from_entries(vec![entry(&a, "g", 1)]);
    let mut series = vec![Series::new(group("g"), vec![a])];
    let plan = plan_reverts(&mut series, snapshot);
    assert!(plan.is_empty());
    assert_eq!(plan.boundary, None);
    assert_eq!(plan.already_applied, 1);
}

#[test]
fn duplicate_ledger_hashes_orphan_the_older_row() {
    let a = Step::new("create table a (id int)");
    let snapshot = LedgerSnapshot::from_entries(vec![entry(&a, "g", 5), entry(&a, "g", 2)]);
    assert_eq!(snapshot.len(), 2);

    let mut series = vec![Series::new(group("g"), vec![a])];
    let plan = plan_reverts(&mut series, snapshot);
    assert_eq!(plan.boundary, Some(2));
    assert_eq!(
        plan.entries.iter().map(|e| e.order).collect::<Vec<_>>(),
        vec![5, 2]
    );
}

#[test]
fn unattributed_rows_count_only_after_a_claimed_one() {
    let a = Step::new("create table a (id int)");
    let b = Step::new("create table b (id int)");
    let c = Step::new("create table c (id int)");
    let foreign = Step::new("create table elsewhere (id int)");

    // Nothing claimed: unattributed rows are left alone.
    let snapshot = LedgerSnapshot::from_entries(vec![entry(&foreign, "", 1)]);
    let mut series = vec![Series::new(group("g"), vec![c.clone()])];
    assert!(plan_reverts(&mut series, snapshot).is_empty());

    // `a` claims order 2, so the unclaimed `b` after it is an orphan while the
    // older foreign row still is not.
    let snapshot = LedgerSnapshot::from_entries(vec![
        entry(&foreign, "", 1),
        entry(&a, "", 2),
        entry(&b, "", 3),
    ]);
    let mut series = vec![Series::new(group("g"), vec![a, c])];
    let plan = plan_reverts(&mut series, snapshot);
    assert_eq!(plan.boundary, Some(3));
    assert_eq!(plan.hashes(), vec![b.hash().clone()]);
    assert_eq!(
        series[0].matched().map(|e| e.order).collect::<Vec<_>>(),
        vec![2]
    );
}

#[test]
fn absorb_adds_later_rows_once_in_descending_order() {
    let a = Step::new("create table a (id int)");
    let b = Step::new("create table b (id int)");
    let other = Step::new("create table other (id int)");
    let snapshot = LedgerSnapshot::from_entries(vec![entry(&a, "g", 1)]);
    let mut series = vec![Series::new(group("g"), vec![b])];
    let mut plan = plan_reverts(&mut series, snapshot);
    assert_eq!(plan.boundary, Some(1));

    let added = plan.absorb(vec![entry(&a, "g", 1), entry(&other, "x", 2)]);
    assert_eq!(added, 1);
    assert_eq!(
        plan.entries.iter().map(|e| e.order).collect::<Vec<_>>(),
        vec![2, 1]
    );

    let mut empty = RevertPlan::default();
    assert_eq!(empty.absorb(vec![entry(&other, "x", 2)]), 0);
    assert!(empty.is_empty());
}

#[test]
fn blocked_step_names_the_waiting_step() {
    let mut series = Series::new(
        group("billing"),
        vec![
            Step::new("create table invoices (id int)")
                .with_name("invoices")
                .with_origin("billing.sql")
                .with_prerequisite("select 1 from users"),
        ],
    );
    let blocked = series.blocked_step().unwrap();
    assert_eq!(blocked.to_string(), "billing/invoices (billing.sql) waiting on `select 1 from users`");
    series.advance();
    assert_eq!(series.blocked_step(), None);
}
