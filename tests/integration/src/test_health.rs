//! Health check and CORS integration tests.

#[cfg(test)]
mod tests {
    use crate::{client, endpoint_url};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_report_running() {
        let resp = client()
            .get(format!("{}/health", endpoint_url()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert!(resp.headers().contains_key("x-request-id"));
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["status"], "running");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_answer_cors_preflight() {
        let resp = client()
            .request(
                reqwest::Method::OPTIONS,
                format!("{}/api/track", endpoint_url()),
            )
            .header("Origin", "http://example.com")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_return_404_for_unknown_path() {
        let resp = client()
            .get(format!("{}/api/nothing", endpoint_url()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
