mod common;

use anyhow::Result;
use reqtail::observability::{SamplingReason, Severity, TraceLevel};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn todo_flow_enriches_the_request_log() -> Result<()> {
    let server = common::TestServer::spawn(common::development_config()).await?;
    let client = reqwest::Client::new();
    let token = server.member_token("user-1", "acme")?;

    let res = client
        .post(server.url("/api/orgs/acme/todos"))
        .bearer_auth(&token)
        .header("user-agent", "reqtail-tests")
        .json(&json!({ "title": "write the release notes" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let records = server.sink.records_for("/api/orgs/acme/todos");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].severity, Severity::Info);
    assert!(records[0]
        .summary
        .as_deref()
        .unwrap()
        .starts_with("POST /api/orgs/acme/todos 201 "));

    let ctx = records[0].record.context().unwrap();
    assert_eq!(ctx.method, "POST");
    assert_eq!(ctx.status_code, Some(201));
    assert!(ctx.duration_ms.is_some());
    assert!(ctx.end_time.is_some());
    assert_eq!(ctx.ip.as_deref(), Some("127.0.0.1"));
    assert_eq!(ctx.user_agent.as_deref(), Some("reqtail-tests"));
    assert_eq!(ctx.user_id.as_deref(), Some("user-1"));
    assert_eq!(ctx.user_role.as_deref(), Some("member"));
    assert_eq!(ctx.org_id.as_deref(), Some("org-acme"));
    assert_eq!(ctx.org_slug.as_deref(), Some("acme"));
    assert_eq!(ctx.org_role.as_deref(), Some("owner"));
    assert_eq!(ctx.db_queries_count, 1);
    assert!(ctx.sampled);
    assert_eq!(ctx.sampling_reason, Some(SamplingReason::All));
    assert!(ctx
        .trace
        .iter()
        .any(|t| t.level == TraceLevel::Info && t.message.starts_with("created todo")));

    // Each request gets its own context
    client
        .get(server.url("/api/orgs/acme/todos"))
        .bearer_auth(&token)
        .send()
        .await?;
    let records = server.sink.records_for("/api/orgs/acme/todos");
    assert_eq!(records.len(), 2);
    let first = records[0].record.context().unwrap();
    let second = records[1].record.context().unwrap();
    assert_ne!(first.request_id, second.request_id);
    assert_eq!(second.db_queries_count, 1);
    Ok(())
}

#[tokio::test]
async fn handler_errors_are_logged_once_on_the_error_path() -> Result<()> {
    let server = common::TestServer::spawn(common::production_config()).await?;
    let client = reqwest::Client::new();
    let token = server.member_token("user-1", "acme")?;

    let forbidden = client
        .get(server.url("/api/orgs/globex/todos"))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let invalid = client
        .post(server.url("/api/orgs/acme/todos"))
        .bearer_auth(&token)
        .json(&json!({ "title": "   " }))
        .send()
        .await?;
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let missing = client
        .delete(server.url("/api/orgs/acme/todos/00000000-0000-4000-8000-000000000000"))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let records = server.sink.records();
    assert_eq!(records.len(), 3);

    let codes: Vec<_> = records
        .iter()
        .map(|r| {
            let ctx = r.record.context().unwrap();
            assert_eq!(r.severity, Severity::Warn);
            assert!(r.summary.is_none());
            assert!(ctx.sampled);
            assert_eq!(ctx.sampling_reason, Some(SamplingReason::Error));
            let error = ctx.error.as_ref().unwrap();
            assert!(error.stack.is_none());
            (ctx.status_code.unwrap(), error.code.clone().unwrap())
        })
        .collect();
    assert_eq!(
        codes,
        vec![
            (403, "FORBIDDEN".to_string()),
            (422, "UNPROCESSABLE_ENTITY".to_string()),
            (404, "NOT_FOUND".to_string()),
        ]
    );

    // The 404 happened after the org was resolved
    let not_found = records[2].record.context().unwrap();
    assert_eq!(not_found.org_slug.as_deref(), Some("acme"));
    assert_eq!(not_found.db_queries_count, 1);

    // Errors bypass the latency window
    assert_eq!(server.observability.tracker().sample_count(), 0);
    Ok(())
}

#[tokio::test]
async fn missing_token_is_logged_as_unauthorized() -> Result<()> {
    let server = common::TestServer::spawn(common::production_config()).await?;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/api/auth/whoami")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["code"], "UNAUTHORIZED");

    let records = server.sink.records();
    assert_eq!(records.len(), 1);
    let ctx = records[0].record.context().unwrap();
    assert_eq!(ctx.status_code, Some(401));
    assert_eq!(ctx.user_id, None);
    assert_eq!(ctx.error.as_ref().unwrap().code.as_deref(), Some("UNAUTHORIZED"));
    Ok(())
}

#[tokio::test]
async fn tokens_are_validated_with_the_server_secret() -> Result<()> {
    let server = common::TestServer::spawn(common::production_config()).await?;
    let client = reqwest::Client::new();

    // Signed for a development deployment, presented to this one
    let development = common::TestServer::spawn(common::development_config()).await?;
    for token in [
        development.member_token("user-1", "acme")?,
        common::foreign_token("user-1")?,
    ] {
        let res = client
            .get(server.url("/api/auth/whoami"))
            .bearer_auth(token)
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    let res = client
        .get(server.url("/api/auth/whoami"))
        .bearer_auth(server.member_token("user-1", "acme")?)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let session = client
        .get(server.url("/api/_auth/session"))
        .bearer_auth(common::foreign_token("user-1")?)
        .send()
        .await?
        .json::<serde_json::Value>()
        .await?;
    assert_eq!(session["data"]["authenticated"], false);

    assert_eq!(server.sink.records().len(), 2);
    Ok(())
}

#[tokio::test]
async fn missing_secret_fails_closed_as_server_error() -> Result<()> {
    let mut config = common::production_config();
    config.security.jwt_secret.clear();
    let server = common::TestServer::spawn(config).await?;
    let client = reqwest::Client::new();

    let res = client
        .get(server.url("/api/auth/whoami"))
        .bearer_auth(common::foreign_token("user-1")?)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let records = server.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].severity, Severity::Error);
    let ctx = records[0].record.context().unwrap();
    assert_eq!(ctx.error.as_ref().unwrap().code.as_deref(), Some("INTERNAL_SERVER_ERROR"));
    Ok(())
}

#[tokio::test]
async fn production_drops_fast_successes() -> Result<()> {
    let server = common::TestServer::spawn(common::production_config()).await?;
    let client = reqwest::Client::new();
    let token = server.member_token("user-1", "acme")?;

    for _ in 0..5 {
        let res = client
            .get(server.url("/api/orgs/acme/todos"))
            .bearer_auth(&token)
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
    }

    assert!(server.sink.is_empty());
    assert_eq!(server.observability.tracker().sample_count(), 5);
    Ok(())
}

#[tokio::test]
async fn full_sample_rate_keeps_fast_successes_as_random() -> Result<()> {
    let mut config = common::production_config();
    config.sampling.sample_rate = 1.0;
    let server = common::TestServer::spawn(config).await?;
    let client = reqwest::Client::new();
    let token = server.member_token("user-1", "acme")?;

    client
        .get(server.url("/api/auth/whoami"))
        .bearer_auth(&token)
        .send()
        .await?;

    let records = server.sink.records();
    assert_eq!(records.len(), 1);
    let ctx = records[0].record.context().unwrap();
    assert_eq!(ctx.sampling_reason, Some(SamplingReason::Random));
    assert!(ctx.sampled);
    Ok(())
}

#[tokio::test]
async fn impersonated_requests_carry_the_admin() -> Result<()> {
    let server = common::TestServer::spawn(common::development_config()).await?;
    let client = reqwest::Client::new();
    let token = server.impersonated_token("user-7", "acme", "admin-9")?;

    let res = client
        .get(server.url("/api/auth/whoami"))
        .bearer_auth(token)
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["data"]["impersonated"], true);

    let records = server.sink.records_for("/api/auth/whoami");
    assert_eq!(records.len(), 1);
    let ctx = records[0].record.context().unwrap();
    assert_eq!(ctx.user_id.as_deref(), Some("user-7"));
    assert!(ctx.is_impersonated);
    assert_eq!(ctx.impersonator_id.as_deref(), Some("admin-9"));
    assert_eq!(ctx.ip.as_deref(), Some("203.0.113.9"));
    assert!(ctx.trace.iter().any(|t| t.message == "impersonation by admin-9"));
    Ok(())
}
