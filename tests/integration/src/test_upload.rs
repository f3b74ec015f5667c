//! Upload integration tests.

#[cfg(test)]
mod tests {
    use crate::{client, payload, post_form, upload_track};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_store_track_and_return_identifier() {
        let client = client();
        let track = payload(4096, 1);

        let resp = post_form(&client, Some("First Song"), Some(&track))
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let json: serde_json::Value = resp.json().await.unwrap();
        let id = json["identifier"].as_str().unwrap();
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            json["message"],
            format!("File uploaded successfully, stored under ObjectID: {id}")
        );
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_assign_distinct_identifiers() {
        let client = client();
        let a = upload_track(&client, "same", b"same bytes").await.unwrap();
        let b = upload_track(&client, "same", b"same bytes").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_require_track_name() {
        let resp = post_form(&client(), None, Some(b"data")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["message"], "No track name in request body");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_require_track_file() {
        let resp = post_form(&client(), Some("No File"), None).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["message"], "No track file in request body");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_non_multipart_body() {
        let resp = client()
            .post(format!("{}/api/track", crate::endpoint_url()))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{\"name\":\"x\"}")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }
}
