use roster_core::db::open_db_in_memory;
use roster_core::{
    CoreError, Feed, ProjectedView, RepoError, RepoResult, RosterProjection, StoreError,
    StoreStudentRepository, StudentDraft, StudentId, StudentRecord, StudentRepository,
    StudentSnapshot, StudentStore, StudentValidationError, Subscription,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn record(id: StudentId, name: &str, course: &str) -> StudentRecord {
    StudentRecord {
        id,
        name: name.to_string(),
        course: course.to_string(),
    }
}

/// Repository whose snapshots are pushed by the test.
struct ScriptedRepository {
    feed: Feed<StudentSnapshot>,
    calls: AtomicUsize,
    insert_delay: Option<Duration>,
    fail_inserts: bool,
}

impl ScriptedRepository {
    fn new(records: Vec<StudentRecord>) -> Arc<Self> {
        Arc::new(Self::build(records, None, false))
    }

    fn build(records: Vec<StudentRecord>, insert_delay: Option<Duration>, fail_inserts: bool) -> Self {
        Self {
            feed: Feed::new(StudentSnapshot::new(0, records)),
            calls: AtomicUsize::new(0),
            insert_delay,
            fail_inserts,
        }
    }

    fn push(&self, revision: u64, records: Vec<StudentRecord>) {
        self.feed.publish(StudentSnapshot::new(revision, records));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StudentRepository for ScriptedRepository {
    fn subscribe_all(&self) -> Subscription<StudentSnapshot> {
        self.feed.subscribe()
    }

    fn list_all(&self) -> RepoResult<Vec<StudentRecord>> {
        Ok(self.feed.latest().records().to_vec())
    }

    fn insert(&self, _draft: &StudentDraft) -> RepoResult<StudentId> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.insert_delay {
            std::thread::sleep(delay);
        }
        if self.fail_inserts {
            return Err(RepoError::Storage(StoreError::InvalidData(
                "disk full".to_string(),
            )));
        }
        Ok(100)
    }

    fn update(&self, id: StudentId, _draft: &StudentDraft) -> RepoResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RepoError::NotFound(id))
    }

    fn delete(&self, id: StudentId) -> RepoResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RepoError::NotFound(id))
    }
}

fn sqlite_projection(seed: &[(&str, &str)]) -> RosterProjection<StoreStudentRepository> {
    let store = StudentStore::open(open_db_in_memory().unwrap()).unwrap();
    for (name, course) in seed {
        store.insert(&StudentDraft::new(name, course).unwrap()).unwrap();
    }
    let repo = StoreStudentRepository::new(Arc::new(store));
    RosterProjection::spawn(repo, &Handle::current())
}

async fn next_view(subscription: &mut Subscription<ProjectedView>) -> ProjectedView {
    timeout(WAIT, subscription.next())
        .await
        .expect("view not published in time")
        .expect("view stream ended")
}

async fn wait_for_view(
    subscription: &mut Subscription<ProjectedView>,
    done: impl Fn(&ProjectedView) -> bool,
) -> ProjectedView {
    loop {
        let view = next_view(subscription).await;
        if done(&view) {
            return view;
        }
    }
}

fn names(view: &ProjectedView) -> Vec<&str> {
    view.records.iter().map(|record| record.name.as_str()).collect()
}

#[tokio::test]
async fn initial_view_mirrors_store_contents() {
    let projection = sqlite_projection(&[("Ann", "Math"), ("Bo", "Art")]);

    let view = projection.current_view();
    assert_eq!(names(&view), vec!["Ann", "Bo"]);
    assert_eq!(view.count, 2);

    let mut views = projection.observe_projected_view();
    assert_eq!(next_view(&mut views).await, view);
}

#[tokio::test]
async fn search_term_filters_case_insensitively() {
    let repo = ScriptedRepository::new(vec![record(1, "Ann", "Math"), record(2, "Bo", "Art")]);
    let projection = RosterProjection::spawn(Arc::clone(&repo), &Handle::current());

    projection.set_search_term("an");
    assert_eq!(projection.current_view().ids(), vec![1]);

    projection.set_search_term("a");
    assert_eq!(projection.current_view().ids(), vec![1, 2]);

    projection.set_search_term("ART");
    assert_eq!(projection.current_view().ids(), vec![2]);
}

#[tokio::test]
async fn clear_restores_full_collection() {
    let repo = ScriptedRepository::new(vec![record(1, "Ann", "Math"), record(2, "Bo", "Art")]);
    let projection = RosterProjection::spawn(Arc::clone(&repo), &Handle::current());

    projection.set_search_term("zzz");
    assert!(projection.current_view().is_empty());

    assert!(projection.clear_search_term());
    assert_eq!(projection.current_view().ids(), vec![1, 2]);
    assert_eq!(projection.search_term(), "");
}

#[tokio::test]
async fn search_term_changes_never_touch_the_store() {
    let repo = ScriptedRepository::new(vec![record(1, "Ann", "Math")]);
    let projection = RosterProjection::spawn(Arc::clone(&repo), &Handle::current());
    let mut views = projection.observe_projected_view();
    next_view(&mut views).await;

    projection.set_search_term("bo");
    assert!(next_view(&mut views).await.is_empty());
    assert_eq!(repo.calls(), 0);
}

#[tokio::test]
async fn snapshot_push_refilters_with_current_term() {
    let repo = ScriptedRepository::new(vec![record(1, "Ann", "Math")]);
    let projection = RosterProjection::spawn(Arc::clone(&repo), &Handle::current());
    projection.set_search_term("art");
    let mut views = projection.observe_projected_view();
    assert!(next_view(&mut views).await.is_empty());

    repo.push(
        1,
        vec![record(1, "Ann", "Math"), record(2, "Bo", "Art"), record(3, "Cy", "Arts")],
    );

    let view = next_view(&mut views).await;
    assert_eq!(view.ids(), vec![2, 3]);
    assert_eq!(projection.search_term(), "art");
}

#[tokio::test]
async fn each_input_transition_publishes_exactly_one_view() {
    let repo = ScriptedRepository::new(vec![record(1, "Ann", "Math")]);
    let projection = RosterProjection::spawn(Arc::clone(&repo), &Handle::current());
    let mut views = projection.observe_projected_view();
    next_view(&mut views).await;

    assert!(projection.set_search_term("a"));
    assert!(!projection.set_search_term("a"));
    repo.push(1, vec![record(1, "Ann", "Math"), record(2, "Bo", "Art")]);

    assert_eq!(next_view(&mut views).await.ids(), vec![1]);
    assert_eq!(next_view(&mut views).await.ids(), vec![1, 2]);
    assert!(timeout(Duration::from_millis(100), views.next()).await.is_err());
}

#[tokio::test]
async fn stale_snapshot_revisions_are_ignored() {
    let repo = ScriptedRepository::new(vec![record(1, "Ann", "Math")]);
    let projection = RosterProjection::spawn(Arc::clone(&repo), &Handle::current());
    let mut views = projection.observe_projected_view();
    next_view(&mut views).await;

    repo.push(3, vec![record(1, "Ann", "Math"), record(2, "Bo", "Art")]);
    repo.push(2, vec![]);
    repo.push(4, vec![record(2, "Bo", "Art")]);

    assert_eq!(next_view(&mut views).await.ids(), vec![1, 2]);
    assert_eq!(next_view(&mut views).await.ids(), vec![2]);
    assert_eq!(projection.current_view().ids(), vec![2]);
}

#[tokio::test]
async fn add_record_rejects_blank_fields_without_calling_repository() {
    let repo = ScriptedRepository::new(Vec::new());
    let projection = RosterProjection::spawn(Arc::clone(&repo), &Handle::current());

    let cases = [("", "X"), ("X", ""), ("  ", "  ")];
    for (name, course) in cases {
        match projection.add_record(name, course) {
            Err(CoreError::Validation(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("blank input `{name}`/`{course}` was accepted"),
        }
    }
    assert!(matches!(
        projection.update_record(1, "Ann", " "),
        Err(CoreError::Validation(StudentValidationError::EmptyCourse))
    ));

    assert_eq!(repo.calls(), 0);
}

#[tokio::test]
async fn add_record_persists_trimmed_fields_and_appends_to_view() {
    let projection = sqlite_projection(&[("Bo", "Art"), ("Cy", "History")]);
    let mut views = projection.observe_projected_view();
    next_view(&mut views).await;

    let id = projection.add_record("  Ann  ", " Math ").unwrap().await.unwrap();

    let view = wait_for_view(&mut views, |view| view.count == 3).await;
    assert_eq!(names(&view), vec!["Bo", "Cy", "Ann"]);
    assert_eq!(view.records[2], record(id, "Ann", "Math"));
}

#[tokio::test]
async fn update_record_replaces_fields_once_subscription_delivers() {
    let projection = sqlite_projection(&[("Ann", "Math"), ("Bo", "Art")]);
    let ann = projection.current_view().records[0].id;
    let mut views = projection.observe_projected_view();
    next_view(&mut views).await;

    projection
        .update_record(ann, "Anne", " Physics")
        .unwrap()
        .await
        .unwrap();

    let view = wait_for_view(&mut views, |view| {
        view.records.iter().any(|record| record.name == "Anne")
    })
    .await;
    assert_eq!(view.records[0], record(ann, "Anne", "Physics"));
    assert_eq!(names(&view), vec!["Anne", "Bo"]);
}

#[tokio::test]
async fn update_record_of_missing_id_surfaces_not_found() {
    let projection = sqlite_projection(&[("Ann", "Math")]);

    let err = projection
        .update_record(42, "Ann", "Math")
        .unwrap()
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(42)));
}

#[tokio::test]
async fn delete_record_removes_row_and_absent_id_is_not_found() {
    let projection = sqlite_projection(&[("Ann", "Math"), ("Bo", "Art")]);
    let bo = projection.current_view().records[1].id;
    let mut views = projection.observe_projected_view();
    next_view(&mut views).await;

    projection.delete_record(bo).unwrap().await.unwrap();
    let view = wait_for_view(&mut views, |view| view.count == 1).await;
    assert_eq!(names(&view), vec!["Ann"]);

    let err = projection.delete_record(99).unwrap().await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(99)));
}

#[tokio::test]
async fn storage_failures_are_relayed_to_the_caller() {
    let repo = Arc::new(ScriptedRepository::build(Vec::new(), None, true));
    let projection = RosterProjection::spawn(Arc::clone(&repo), &Handle::current());

    let err = projection.add_record("Ann", "Math").unwrap().await.unwrap_err();
    assert!(matches!(err, CoreError::Storage(StoreError::InvalidData(_))));
    assert_eq!(repo.calls(), 1);
}

#[tokio::test]
async fn search_term_stream_replays_latest_value() {
    let repo = ScriptedRepository::new(Vec::new());
    let projection = RosterProjection::spawn(Arc::clone(&repo), &Handle::current());
    projection.set_search_term("math");

    let mut terms = projection.observe_search_term();
    assert_eq!(terms.next().await.as_deref(), Some("math"));

    projection.clear_search_term();
    assert_eq!(terms.next().await.as_deref(), Some(""));
}

#[tokio::test]
async fn shutdown_ends_streams_and_rejects_further_work() {
    let repo = ScriptedRepository::new(vec![record(1, "Ann", "Math")]);
    let projection = RosterProjection::spawn(Arc::clone(&repo), &Handle::current());
    let mut views = projection.observe_projected_view();
    let mut terms = projection.observe_search_term();
    next_view(&mut views).await;
    terms.next().await;

    projection.shutdown();
    projection.shutdown();

    assert!(projection.is_shut_down());
    assert_eq!(timeout(WAIT, views.next()).await.unwrap(), None);
    assert_eq!(timeout(WAIT, terms.next()).await.unwrap(), None);
    assert!(!projection.set_search_term("a"));
    assert!(matches!(
        projection.add_record("Bo", "Art"),
        Err(CoreError::Closed)
    ));

    repo.push(1, Vec::new());
    assert_eq!(projection.current_view().ids(), vec![1]);
    assert_eq!(repo.calls(), 0);
}

#[tokio::test]
async fn shutdown_cancels_in_flight_mutations() {
    let repo = Arc::new(ScriptedRepository::build(
        Vec::new(),
        Some(Duration::from_millis(200)),
        false,
    ));
    let projection = RosterProjection::spawn(Arc::clone(&repo), &Handle::current());

    let pending = projection.add_record("Ann", "Math").unwrap();
    projection.shutdown();

    let err = timeout(WAIT, pending).await.unwrap().unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
}

#[tokio::test]
async fn cancelled_mutation_never_reaches_the_repository() {
    let repo = ScriptedRepository::new(Vec::new());
    let projection = RosterProjection::spawn(Arc::clone(&repo), &Handle::current());

    let pending = projection.add_record("Ann", "Math").unwrap();
    assert!(!pending.is_finished());
    pending.cancel();

    let err = timeout(WAIT, pending).await.unwrap().unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
    assert_eq!(repo.calls(), 0);

    let id = timeout(WAIT, projection.add_record("Bo", "Art").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(id, 100);
    assert_eq!(repo.calls(), 1);
}

#[tokio::test]
async fn dropping_the_projection_releases_the_store_subscription() {
    let repo = ScriptedRepository::new(Vec::new());
    let projection = RosterProjection::spawn(Arc::clone(&repo), &Handle::current());
    let mut views = projection.observe_projected_view();
    next_view(&mut views).await;

    drop(projection);

    assert_eq!(timeout(WAIT, views.next()).await.unwrap(), None);
    for _ in 0..50 {
        if repo.feed.observer_count() == 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(repo.feed.observer_count(), 0);
}
