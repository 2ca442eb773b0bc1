//! Image generation poller integration tests
//!
//! The image origin is a `wiremock` server: the submit step answers with a
//! redirect carrying the job id, and the result page stays empty until the
//! job is ready.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hubrelay::config::{ImageConfig, UpstreamConfig};
use hubrelay::image::{ImageGenerator, ImageJob};
use hubrelay::RelayError;

const RESULT_PATH: &str = "/images/create/async/results/job-7";

fn generator(server: &MockServer, max_polls: u32) -> ImageGenerator {
    let config = ImageConfig {
        enabled: true,
        base_url: server.uri(),
        max_polls,
        poll_interval_ms: 1,
    };
    let upstream = UpstreamConfig {
        cookie: Some("_U=token".to_string()),
        ..Default::default()
    };
    ImageGenerator::new(&config, &upstream).expect("image generator")
}

async fn mount_submit(server: &MockServer) {
    Mock::given(method("HEAD"))
        .and(path("/images/create"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/images/create?q=fox&rt=4&FORM=GENCRE&id=job-7"),
        )
        .expect(1)
        .mount(server)
        .await;
}

fn job() -> ImageJob {
    ImageJob {
        prompt: "a red fox".to_string(),
        iframe_id: "frame-1".to_string(),
        result_id: "job-7".to_string(),
        attempts: 0,
    }
}

/// Three empty polls, then a result page: the fourth poll succeeds and the
/// references keep document order.
#[tokio::test]
async fn test_poll_succeeds_on_fourth_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RESULT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(RESULT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(concat!(
            r#"<div class="imgpt"><img class="mimg" height="270" src="https://th.example/id/A?w=270&amp;h=270" alt="fox"></div>"#,
            r#"<div class="imgpt"><img class="mimg" src="https://th.example/id/B"></div>"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mut job = job();
    let markdown = generator(&server, 10).poll(&mut job).await.unwrap();

    assert_eq!(job.attempts, 4);
    assert_eq!(
        markdown,
        "![a red fox](https://th.example/id/A?w=270&h=270) ![a red fox](https://th.example/id/B)"
    );
}

/// A result page that never fills up exhausts the configured attempts.
#[tokio::test]
async fn test_poll_exhaustion_reports_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RESULT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(" "))
        .expect(10)
        .mount(&server)
        .await;

    let mut job = job();
    let err = generator(&server, 10).poll(&mut job).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<RelayError>(),
        Some(RelayError::PollExhausted { attempts: 10 })
    ));
    assert_eq!(job.attempts, 10);
}

/// The default cap is the total number of polls made, not a retry count.
#[tokio::test]
async fn test_default_cap_bounds_total_polls() {
    let server = MockServer::start().await;
    let default_polls = ImageConfig::default().max_polls;
    Mock::given(method("GET"))
        .and(path(RESULT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(u64::from(default_polls))
        .mount(&server)
        .await;

    let mut job = job();
    let err = generator(&server, default_polls)
        .poll(&mut job)
        .await
        .unwrap_err();

    assert_eq!(default_polls, 10);
    assert!(matches!(
        err.downcast_ref::<RelayError>(),
        Some(RelayError::PollExhausted { attempts: 10 })
    ));
    assert_eq!(job.attempts, default_polls);
}

/// Submit and poll run back to back through `generate`.
#[tokio::test]
async fn test_generate_submits_then_polls() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    Mock::given(method("GET"))
        .and(path(RESULT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<img class="mimg" src="https://th.example/id/only">"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let markdown = generator(&server, 3)
        .generate("a red fox", "frame-1")
        .await
        .unwrap();
    assert_eq!(markdown, "![a red fox](https://th.example/id/only)");
}

/// A redirect without a job id means the login cookie was not accepted;
/// nothing is polled.
#[tokio::test]
async fn test_generate_without_job_id_is_not_authenticated() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/fd/auth/signin"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("never"))
        .expect(0)
        .mount(&server)
        .await;

    let err = generator(&server, 3)
        .generate("a red fox", "frame-1")
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RelayError>(),
        Some(RelayError::NotAuthenticated(_))
    ));
}
