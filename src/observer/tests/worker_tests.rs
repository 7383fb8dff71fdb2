use super::*;
use crate::observer::extract::SiteMarkup;
use crate::observer::testing::{self, error_envelope, ok_envelope, FakeSite};
use crate::session::errors::SessionError;
use crate::session::testing::ScriptedTransport;
use crate::session::transport::{HttpRequest, HttpResponse};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Stands in for the supervisor and forwards failure reports to the test.
struct Recorder;

#[async_trait]
impl Actor for Recorder {
    type Msg = SupervisorMsg;
    type State = mpsc::UnboundedSender<WorkerFailure>;
    type Arguments = mpsc::UnboundedSender<WorkerFailure>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        tx: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(tx)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        tx: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let SupervisorMsg::WorkerFailed(failure) = message {
            let _ = tx.send(failure);
        }
        Ok(())
    }
}

struct Harness {
    worker: WorkerHandle,
    join: JoinHandle<()>,
    failures: mpsc::UnboundedReceiver<WorkerFailure>,
    recorder: ActorRef<SupervisorMsg>,
}

async fn start(transport: Arc<dyn Transport>, period: Duration, remove: bool) -> Harness {
    let (tx, rx) = mpsc::unbounded_channel();
    let (recorder, _) = Recorder::spawn(None, Recorder, tx).await.expect("recorder");
    let mut settings = testing::settings();
    settings.polling_period = period;
    settings.remove_subscriptions = remove;
    let args = WorkerArgs {
        account: testing::account(),
        generation: 7,
        settings: Arc::new(settings),
        transport,
        extractor: Arc::new(SiteMarkup::new().expect("markup")),
        supervisor: recorder.clone(),
    };
    let (worker, join) = WorkerHandle::spawn(args, None).await.expect("worker spawn");
    Harness {
        worker,
        join,
        failures: rx,
        recorder,
    }
}

async fn wait_for_phase(worker: &WorkerHandle, phase: WorkerPhase) {
    for _ in 0..200 {
        if worker.phase().await == Some(phase) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("worker never reached {:?}", phase);
}

async fn next_failure(rx: &mut mpsc::UnboundedReceiver<WorkerFailure>) -> WorkerFailure {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("failure report in time")
        .expect("recorder alive")
}

#[tokio::test]
async fn test_worker_logs_in_and_polls_periodically() {
    let site = FakeSite::new();
    let transport = site.transport();
    let mut h = start(Arc::new(transport.clone()), Duration::from_millis(40), true).await;

    wait_for_phase(&h.worker, WorkerPhase::Polling).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let ticks = transport.requests_to("/services").len();
    assert!(ticks >= 2, "expected repeated ticks, saw {}", ticks);
    assert!(h.failures.try_recv().is_err(), "healthy worker reports nothing");

    h.worker.destroy();
    h.recorder.stop(None);
}

#[tokio::test]
async fn test_login_failure_is_reported_once_and_worker_stays_failed() {
    let site = FakeSite::new();
    site.update(|s| s.login_succeeds = false);
    let mut h = start(Arc::new(site.transport()), Duration::from_millis(20), true).await;

    let failure = next_failure(&mut h.failures).await;
    assert_eq!(failure.account, testing::account().id);
    assert_eq!(failure.generation, 7);
    assert_eq!(failure.error, ObserverError::auth("Wrong password"));

    wait_for_phase(&h.worker, WorkerPhase::Failed).await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(h.failures.try_recv().is_err(), "no polling after failed login");

    h.worker.destroy();
    h.recorder.stop(None);
}

#[tokio::test]
async fn test_tick_failure_is_reported_and_timer_keeps_running() {
    let site = FakeSite::new();
    site.update(|s| s.services = vec![error_envelope("maintenance")].into());
    let mut h = start(Arc::new(site.transport()), Duration::from_millis(30), true).await;

    let first = next_failure(&mut h.failures).await;
    let second = next_failure(&mut h.failures).await;
    assert_eq!(first.error, ObserverError::remote("maintenance"));
    assert_eq!(second.error, ObserverError::remote("maintenance"));
    assert_eq!(h.worker.phase().await, Some(WorkerPhase::Polling));

    h.worker.destroy();
    h.recorder.stop(None);
}

#[tokio::test]
async fn test_each_failed_removal_is_reported() {
    let site = FakeSite::new();
    site.update(|s| {
        s.subscriptions = ok_envelope(
            r#"[{"name":"A","prov_id":"1","serv_id":"10"},{"name":"B","prov_id":"2","serv_id":"20"}]"#,
        );
        s.delete_failures = vec![
            ("10".to_string(), error_envelope("locked")),
            ("20".to_string(), error_envelope("gone")),
        ];
    });
    let mut h = start(Arc::new(site.transport()), Duration::from_secs(60), true).await;

    let first = next_failure(&mut h.failures).await;
    let second = next_failure(&mut h.failures).await;
    assert_eq!(first.error, ObserverError::remote("locked"));
    assert_eq!(second.error, ObserverError::remote("gone"));

    h.worker.destroy();
    h.recorder.stop(None);
}

#[tokio::test]
async fn test_report_only_worker_never_deletes() {
    let site = FakeSite::new();
    site.update(|s| {
        s.subscriptions = ok_envelope(r#"[{"name":"A","prov_id":"1","serv_id":"10"}]"#);
    });
    let transport = site.transport();
    let h = start(Arc::new(transport.clone()), Duration::from_secs(60), false).await;

    wait_for_phase(&h.worker, WorkerPhase::Polling).await;
    for _ in 0..100 {
        if !transport.requests_to("/subscription").is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(transport.requests_to("/subscription").len(), 1);
    assert!(transport
        .requests()
        .iter()
        .all(|r| r.method != crate::session::transport::Method::Delete));

    h.worker.destroy();
    h.recorder.stop(None);
}

#[tokio::test]
async fn test_destroy_is_idempotent_and_stops_the_timer() {
    let site = FakeSite::new();
    let transport = site.transport();
    let h = start(Arc::new(transport.clone()), Duration::from_millis(20), true).await;
    wait_for_phase(&h.worker, WorkerPhase::Polling).await;

    h.worker.destroy();
    h.worker.destroy();
    tokio::time::timeout(Duration::from_secs(2), h.join)
        .await
        .expect("worker stops")
        .expect("worker exits cleanly");

    assert_eq!(h.worker.phase().await, None);
    let seen = transport.requests().len();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(transport.requests().len(), seen, "no requests after destroy");

    h.worker.destroy();
    h.recorder.stop(None);
}

#[tokio::test]
async fn test_destroy_before_polling_is_safe() {
    let transport = ScriptedTransport::new(|_| {
        std::thread::sleep(Duration::from_millis(30));
        Ok(HttpResponse::new(200, "<html></html>"))
    });
    let h = start(Arc::new(transport), Duration::from_millis(20), true).await;

    h.worker.destroy();
    h.worker.destroy();
    tokio::time::timeout(Duration::from_secs(2), h.join)
        .await
        .expect("worker stops")
        .expect("worker exits cleanly");
    h.recorder.stop(None);
}

/// Counts concurrent requests across the whole worker.
struct SlowTransport {
    inner: ScriptedTransport,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl Transport for SlowTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, SessionError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(15)).await;
        let result = self.inner.execute(request).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[tokio::test]
async fn test_ticks_never_overlap_when_slower_than_period() {
    let site = FakeSite::new();
    let slow = Arc::new(SlowTransport {
        inner: site.transport(),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let h = start(slow.clone(), Duration::from_millis(5), true).await;

    wait_for_phase(&h.worker, WorkerPhase::Polling).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(slow.inner.requests_to("/services").len() >= 2);
    assert_eq!(slow.max_in_flight.load(Ordering::SeqCst), 1);

    h.worker.destroy();
    h.recorder.stop(None);
}
