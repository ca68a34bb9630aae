//! Single-flight browser launch and recovery.

use kodegen_tools_render::{
    BrowserLauncher, EngineError, LaunchFailure, MetricsEmitter, MetricsSink, Phase,
    ProcessManager, ProcessStatus,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

mod common;
use common::{MockEngine, MockLauncher, PageBehavior, RecordingSink};

fn manager(launcher: &Arc<MockLauncher>, sink: &Arc<RecordingSink>) -> Arc<ProcessManager> {
    Arc::new(ProcessManager::new(
        Arc::clone(launcher) as Arc<dyn BrowserLauncher>,
        MetricsEmitter::new(Arc::clone(sink) as Arc<dyn MetricsSink>),
        Duration::from_secs(30),
    ))
}

#[tokio::test]
async fn concurrent_callers_share_one_launch() {
    let launcher = MockLauncher::slow(MockEngine::new(PageBehavior::default()), Duration::from_millis(50));
    let sink = Arc::new(RecordingSink::default());
    let manager = manager(&launcher, &sink);

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get_process().await.map(|_| ()) })
        })
        .collect();
    for caller in callers {
        caller.await.unwrap().unwrap();
    }

    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(manager.launch_attempts(), 1);
    assert_eq!(manager.status().await, ProcessStatus::Ready);
    assert_eq!(sink.phase(Phase::Launch).len(), 1);

    // Ready handle is reused without relaunching
    manager.get_process().await.unwrap();
    assert_eq!(launcher.launch_count(), 1);
}

#[tokio::test]
async fn failed_launches_do_not_poison_later_calls() {
    let launcher = MockLauncher::failing(MockEngine::new(PageBehavior::default()), 2);
    let sink = Arc::new(RecordingSink::default());
    let manager = manager(&launcher, &sink);

    for _ in 0..2 {
        let err = manager.get_process().await.err().unwrap();
        assert!(matches!(
            err,
            EngineError::EngineUnavailable {
                failure: LaunchFailure::MissingBinary,
                ..
            }
        ));
    }
    assert_eq!(
        manager.status().await,
        ProcessStatus::Failed(LaunchFailure::MissingBinary)
    );

    manager.get_process().await.unwrap();
    assert_eq!(launcher.launch_count(), 3);
    assert_eq!(manager.status().await, ProcessStatus::Ready);

    let launches = sink.phase(Phase::Launch);
    assert_eq!(launches.len(), 3);
    assert_eq!(
        launches[0].failure_mode.as_deref(),
        Some("engine_unavailable:missing_binary")
    );
    assert!(launches[2].success);
}

#[tokio::test]
async fn unhealthy_browser_is_replaced() {
    let engine = MockEngine::new(PageBehavior::default());
    let launcher = MockLauncher::new(Arc::clone(&engine));
    let sink = Arc::new(RecordingSink::default());
    let manager = manager(&launcher, &sink);

    manager.get_process().await.unwrap();
    engine.healthy.store(false, Ordering::SeqCst);

    // A freshly launched handle is returned without a health check
    manager.get_process().await.unwrap();

    assert_eq!(engine.counters.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(launcher.launch_count(), 2);
    assert_eq!(manager.status().await, ProcessStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn slow_launch_times_out() {
    let launcher = MockLauncher::slow(MockEngine::new(PageBehavior::default()), Duration::from_secs(120));
    let sink = Arc::new(RecordingSink::default());
    let manager = Arc::new(ProcessManager::new(
        Arc::clone(&launcher) as Arc<dyn BrowserLauncher>,
        MetricsEmitter::new(Arc::clone(&sink) as Arc<dyn MetricsSink>),
        Duration::from_secs(5),
    ));

    let err = manager.get_process().await.err().unwrap();
    assert!(matches!(
        err,
        EngineError::EngineUnavailable {
            failure: LaunchFailure::LaunchTimeout,
            ..
        }
    ));
}

#[tokio::test]
async fn shutdown_closes_the_running_browser() {
    let engine = MockEngine::new(PageBehavior::default());
    let launcher = MockLauncher::new(Arc::clone(&engine));
    let sink = Arc::new(RecordingSink::default());
    let manager = manager(&launcher, &sink);

    manager.get_process().await.unwrap();
    manager.shutdown().await.unwrap();
    manager.shutdown().await.unwrap();

    assert_eq!(engine.counters.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(manager.status().await, ProcessStatus::Uninitialized);
}
