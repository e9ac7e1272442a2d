mod common;

use common::BatchFixture;
use proptest::prelude::*;
use simbrowse::*;
use std::sync::{Arc, Mutex};

type Events = Arc<Mutex<Vec<(String, usize, InputChannel)>>>;

struct Recorder(Events);

impl SelectionObserver for Recorder {
    fn index_changed(&mut self, dimension: &str, index: usize, source: InputChannel) {
        self.0.lock().unwrap().push((dimension.to_string(), index, source));
    }
}

fn recording(session: &mut Session) -> Events {
    let events: Events = Arc::default();
    session.subscribe(Box::new(Recorder(events.clone())));
    events
}

fn values(session: &Session) -> (ParamValue, ParamValue) {
    let catalog = session.catalog();
    let record = session.current_record().unwrap();
    (
        catalog.value_of(record, "A").unwrap().clone(),
        catalog.value_of(record, "B").unwrap().clone(),
    )
}

#[test]
fn session_starts_at_middle_indices() {
    let fx = BatchFixture::grid();
    let session = fx.session();
    assert_eq!(session.selection().indices(), &[1, 0]);
    assert_eq!(session.current_sim_num(), Some(3));
    assert_eq!(session.selection().describe(session.catalog()), "A=2, B=10");
}

#[test]
fn select_then_step_walks_the_grid() {
    let fx = BatchFixture::grid();
    let mut session = fx.session();

    let report = session.select_value("A", "2", InputChannel::Picker).unwrap();
    assert_eq!(report.sim_num, 3);
    let report = session.select_value("B", "20", InputChannel::Slider).unwrap();
    assert_eq!(report.sim_num, 4);
    assert!(!report.is_ambiguous());
    assert_eq!(session.current_sim_num(), Some(4));

    let record = session.step(Direction::Forward, false).unwrap();
    assert_eq!(record.sim_num, 5);
    assert_eq!(values(&session), (ParamValue::Integer(3), ParamValue::Integer(10)));
    assert_eq!(session.selection().dimension_index("A"), Some(2));
    assert_eq!(session.selection().dimension_index("B"), Some(0));

    let err = session.step(Direction::Forward, true).unwrap_err();
    assert_eq!(err, NavigationError::Boundary(BoundaryReached::Last));
    assert_eq!(session.current_sim_num(), Some(5));
    assert_eq!(session.selection().indices(), &[2, 0]);
}

#[test]
fn boundaries_refuse_without_saturating() {
    let fx = BatchFixture::grid();
    let mut session = fx.session();

    session.goto(1).unwrap();
    let before = session.selection().indices().to_vec();
    assert_eq!(
        session.step(Direction::Backward, false).unwrap_err(),
        NavigationError::Boundary(BoundaryReached::First)
    );
    assert_eq!(session.current_sim_num(), Some(1));
    assert_eq!(session.selection().indices(), before.as_slice());

    session.goto(4).unwrap();
    // 4 + 3 overshoots 6 and is refused rather than clamped.
    assert_eq!(
        session.step_by(Direction::Forward, 3).unwrap_err(),
        NavigationError::Boundary(BoundaryReached::Last)
    );
    assert_eq!(session.current_sim_num(), Some(4));
    assert_eq!(session.step_by(Direction::Forward, 2).unwrap().sim_num, 6);
    assert_eq!(
        session.step(Direction::Forward, false).unwrap_err(),
        NavigationError::Boundary(BoundaryReached::Last)
    );
}

#[test]
fn target_handles_extreme_values() {
    let nav = NavigationController::default();
    assert_eq!(nav.target(6, 6, Direction::Forward, u32::MAX), Err(BoundaryReached::Last));
    assert_eq!(nav.target(6, 1, Direction::Backward, u32::MAX), Err(BoundaryReached::First));
    assert_eq!(nav.target(6, 3, Direction::Backward, 2), Ok(1));
    assert_eq!(NavigationController::new(0).fast_step, 1);
}

#[test]
fn failed_reconcile_writes_nothing_and_does_not_move() {
    let grid = BatchFixture::grid();
    let catalog = grid.load();
    let mut selection = SelectionState::new(&catalog);
    let events: Events = Arc::default();
    selection.subscribe(Box::new(Recorder(events.clone())));

    // Same dimension names, but record 3 has B=30, which has no index in the grid's B.
    let other = BatchFixture::new("wave", "SimNum,A,B\n1,1,10\n2,5,20\n3,3,30\n").load();
    let mut current = Some(1);
    let err = NavigationController::default()
        .step(&other, &mut selection, &mut current, Direction::Forward, 2)
        .unwrap_err();

    assert!(matches!(
        err,
        NavigationError::Reconcile {
            sim_num: 3,
            source: RangeError::IndexOutOfBounds { ref dimension, .. },
        } if dimension == "B"
    ));
    assert_eq!(current, Some(1));
    assert_eq!(selection.indices(), &[1, 0]);
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn resolve_is_idempotent() {
    let fx = BatchFixture::grid();
    let mut session = fx.session();
    session.select("B", 1, InputChannel::Slider).unwrap();
    let first = session.resolve().unwrap().sim_num;
    let second = session.resolve().unwrap().sim_num;
    assert_eq!(first, second);
    assert_eq!(first, 4);
}

#[test]
fn picker_and_slider_share_one_index() {
    let fx = BatchFixture::grid();
    let mut session = fx.session();
    let events = recording(&mut session);

    session.select("A", 0, InputChannel::Picker).unwrap();
    session.select("A", 2, InputChannel::Slider).unwrap();
    assert_eq!(session.selection().dimension_index("A"), Some(2));

    let seen = events.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ("A".to_string(), 0, InputChannel::Picker),
            ("A".to_string(), 2, InputChannel::Slider),
        ]
    );
}

#[test]
fn navigation_notifies_every_dimension() {
    let fx = BatchFixture::grid();
    let mut session = fx.session();
    let events = recording(&mut session);

    session.step(Direction::Forward, false).unwrap();
    let seen = events.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ("A".to_string(), 1, InputChannel::Navigation),
            ("B".to_string(), 1, InputChannel::Navigation),
        ]
    );
}

#[test]
fn rejected_writes_leave_selection_untouched() {
    let fx = BatchFixture::grid();
    let mut session = fx.session();
    let events = recording(&mut session);

    let err = session.select("A", 3, InputChannel::Slider).unwrap_err();
    assert_eq!(
        err,
        SelectError::Range(RangeError::IndexOutOfBounds {
            dimension: "A".to_string(),
            index: 3,
            len: 3,
        })
    );
    let err = session.select("C", 0, InputChannel::Picker).unwrap_err();
    assert_eq!(err, SelectError::Range(RangeError::UnknownDimension("C".to_string())));

    assert_eq!(session.selection().indices(), &[1, 0]);
    assert_eq!(session.current_sim_num(), Some(3));
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn sparse_grid_reports_no_match_and_keeps_current() {
    let csv = "SimNum,A,B\n1,1,10\n2,2,20\n";
    let fx = BatchFixture::new("wave", csv);
    let mut session = fx.session();
    // Middle of two values is index 0 on both: (1, 10).
    assert_eq!(session.current_sim_num(), Some(1));

    let err = session.select("B", 1, InputChannel::Picker).unwrap_err();
    assert!(matches!(err, SelectError::Lookup(LookupError::NoMatch(ref s)) if s == "A=1, B=20"));
    assert_eq!(session.selection().dimension_index("B"), Some(1));
    assert_eq!(session.current_sim_num(), Some(1));
}

#[test]
fn duplicate_rows_resolve_to_the_first() {
    let csv = "SimNum,A\n1,5\n2,7\n3,5\n";
    let fx = BatchFixture::new("dup", csv);
    let mut session = fx.session();

    let report = session.select("A", 0, InputChannel::Picker).unwrap();
    assert_eq!(report.sim_num, 1);
    assert_eq!(report.matches, vec![1, 3]);
    assert!(report.is_ambiguous());
}

#[test]
fn failed_open_keeps_previous_session() {
    let fx = BatchFixture::grid();
    let mut browser = Browser::new(CatalogOptions::default(), NavigationController::new(2));
    assert!(browser.session().is_none());

    browser.open_batch(fx.path()).unwrap().goto(6).unwrap();

    let missing = fx.dir.path().join("nowhere");
    assert!(matches!(browser.open_batch(&missing), Err(LoadError::FileNotFound(_))));
    assert_eq!(browser.batch_folder(), Some(fx.path()));
    assert_eq!(browser.session().and_then(Session::current_sim_num), Some(6));
}

#[test]
fn reload_picks_up_changes_on_disk() {
    let fx = BatchFixture::grid();
    let mut browser = Browser::new(CatalogOptions::default(), NavigationController::default());
    browser.open_batch(fx.path()).unwrap();

    std::fs::write(
        fx.path().join("parlist_sim.csv"),
        format!("{}7,4,10\n", common::GRID_CSV),
    )
    .unwrap();
    let session = browser.reload().unwrap();
    assert_eq!(session.catalog().total_num_sims(), 7);
    assert_eq!(session.navigator().fast_step, 10);

    std::fs::write(fx.path().join("parlist_sim.csv"), "SimNum,A\n2,1\n").unwrap();
    assert!(matches!(browser.reload(), Err(LoadError::NonContiguousSimNum { .. })));
    assert_eq!(browser.session().unwrap().catalog().total_num_sims(), 7);
}

#[test]
fn reload_without_open_batch_fails() {
    let mut browser = Browser::new(CatalogOptions::default(), NavigationController::default());
    assert!(browser.reload().is_err());
}

fn grid_csv(a: usize, b: usize) -> String {
    let mut csv = String::from("SimNum,A,B\n");
    let mut n = 1;
    for i in 0..a {
        for j in 0..b {
            csv.push_str(&format!("{n},{},{}\n", i * 3, j as f64 * 0.5));
            n += 1;
        }
    }
    csv
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn forward_then_backward_returns_to_start(
        a in 1usize..5,
        b in 1usize..5,
        start_seed in 0u32..100,
        k in 0u32..30,
    ) {
        let fx = BatchFixture::new("p", &grid_csv(a, b));
        let mut session = fx.session();
        let total = session.catalog().total_num_sims();
        let start = start_seed % total + 1;
        session.goto(start).unwrap();
        let indices = session.selection().indices().to_vec();

        match session.step_by(Direction::Forward, k) {
            Ok(r) => {
                prop_assert_eq!(r.sim_num, start + k);
                let back = session.step_by(Direction::Backward, k).unwrap();
                prop_assert_eq!(back.sim_num, start);
                prop_assert_eq!(session.selection().indices(), indices.as_slice());
            }
            Err(boundary) => {
                prop_assert_eq!(boundary, NavigationError::Boundary(BoundaryReached::Last));
                prop_assert!(start + k > total);
                prop_assert_eq!(session.current_sim_num(), Some(start));
            }
        }
    }

    #[test]
    fn reconciled_selection_resolves_to_the_same_run(
        a in 1usize..5,
        b in 1usize..5,
        seed in 0u32..100,
    ) {
        let fx = BatchFixture::new("p", &grid_csv(a, b));
        let mut session = fx.session();
        let target = seed % session.catalog().total_num_sims() + 1;
        session.goto(target).unwrap();
        prop_assert_eq!(session.resolve().unwrap().sim_num, target);
    }
}
