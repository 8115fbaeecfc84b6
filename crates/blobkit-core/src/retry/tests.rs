use super::*;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
enum TestError {
    Transient,
    Fatal,
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Transient => f.write_str("transient"),
            TestError::Fatal => f.write_str("fatal"),
        }
    }
}

fn policy() -> RetryPolicy<TestError> {
    RetryPolicy::new()
        .with_max_attempts(3)
        .retry_if(|e| *e == TestError::Transient)
        .with_backoff(backoff::fixed(Duration::from_millis(100)))
}

#[test]
fn test_decide() {
    let policy = policy();
    assert_eq!(
        policy.decide(0, &TestError::Transient),
        RetryDecision::Retry(Duration::from_millis(100))
    );
    assert_eq!(policy.decide(3, &TestError::Transient), RetryDecision::Exhausted);
    assert_eq!(policy.decide(0, &TestError::Fatal), RetryDecision::Permanent);
}

#[test]
fn test_default_policy() {
    let policy: RetryPolicy<TestError> = RetryPolicy::default();
    assert_eq!(policy.max_attempts(), DEFAULT_MAX_ATTEMPTS);
    match policy.decide(0, &TestError::Fatal) {
        RetryDecision::Retry(delay) => {
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(600));
        },
        other => panic!("unexpected decision {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_after_transient_failures() {
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    let result = policy()
        .run("flaky", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TestError::Transient)
            } else {
                Ok("done")
            }
        })
        .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_exhausts_after_max_retries() {
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    let result: Result<(), _> = policy()
        .run("always failing", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Transient)
        })
        .await;

    let error = result.unwrap_err();
    assert!(error.is_exhausted());
    assert_eq!(error.to_string(), "Retries exhausted: 3/3");
    assert_eq!(error.into_inner(), TestError::Transient);
    // one initial attempt plus three retries
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(start.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_permanent_error_is_not_retried() {
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    let result: Result<(), _> = policy()
        .run("fatal", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Fatal)
        })
        .await;

    let error = result.unwrap_err();
    assert!(!error.is_exhausted());
    assert_eq!(error.to_string(), "fatal");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_policy() {
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = RetryPolicy::none()
        .run("single shot", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Transient)
        })
        .await;

    assert!(result.unwrap_err().is_exhausted());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_selected_per_error() {
    let calls = AtomicU32::new(0);
    let start = Instant::now();
    let short: Arc<dyn BackOff> = Arc::new(backoff::fixed(Duration::from_millis(10)));
    let long: Arc<dyn BackOff> = Arc::new(backoff::fixed(Duration::from_secs(1)));

    let policy = RetryPolicy::new()
        .with_max_attempts(2)
        .with_backoff_selector(move |e: &TestError| match e {
            TestError::Transient => Arc::clone(&short),
            TestError::Fatal => Arc::clone(&long),
        });

    let result: Result<(), _> = policy
        .run("mixed", || async {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(TestError::Transient),
                _ => Err(TestError::Fatal),
            }
        })
        .await;

    assert!(result.unwrap_err().is_exhausted());
    assert_eq!(start.elapsed(), Duration::from_millis(1010));
}

#[tokio::test(start_paused = true)]
async fn test_exponential_schedule_elapsed() {
    let start = Instant::now();
    let policy: RetryPolicy<TestError> = RetryPolicy::new()
        .with_max_attempts(3)
        .with_backoff(backoff::exponential(
            Duration::from_millis(100),
            2.0,
            Duration::from_secs(60),
        ));

    let result: Result<(), _> = policy.run("exp", || async { Err(TestError::Transient) }).await;

    assert!(result.is_err());
    assert_eq!(start.elapsed(), Duration::from_millis(700));
}
