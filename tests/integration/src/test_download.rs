//! Download integration tests.

#[cfg(test)]
mod tests {
    use crate::{client, md5_hex, payload, track_url, upload_track};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_stream_back_uploaded_bytes() {
        let client = client();
        // Spans several default-sized chunks with a short tail.
        let track = payload(3 * 261_120 + 17, 7);
        let id = upload_track(&client, "Multi Chunk", &track).await.unwrap();

        let resp = client.get(track_url(&id)).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("audio/mp3")
        );
        assert_eq!(
            resp.headers()
                .get(reqwest::header::ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok()),
            Some("bytes")
        );
        let etag = resp
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        let body = resp.bytes().await.unwrap();
        assert_eq!(body.len(), track.len());
        assert_eq!(body.as_ref(), track.as_slice());
        assert_eq!(etag, Some(format!("\"{}\"", md5_hex(&track))));
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_stream_empty_track() {
        let client = client();
        let id = upload_track(&client, "Silence", b"").await.unwrap();

        let resp = client.get(track_url(&id)).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert!(resp.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_malformed_identifier() {
        let resp = client().get(track_url("abc")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(
            json["message"],
            "Invalid trackID in URL parameter. Must be a string of 24 hex characters"
        );
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_return_404_for_unknown_identifier() {
        let resp = client()
            .get(track_url("000000000000000000000000"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        assert!(resp.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_serve_concurrent_downloads() {
        let client = client();
        let mut ids = Vec::new();
        for seed in 0..4_u8 {
            let track = payload(300_000 + usize::from(seed), seed);
            let id = upload_track(&client, &format!("track-{seed}"), &track)
                .await
                .unwrap();
            ids.push((id, track));
        }

        let downloads = ids.iter().map(|(id, track)| {
            let client = client.clone();
            async move {
                let body = client
                    .get(track_url(id))
                    .send()
                    .await
                    .unwrap()
                    .bytes()
                    .await
                    .unwrap();
                assert_eq!(body.as_ref(), track.as_slice());
            }
        });
        futures::future::join_all(downloads).await;
    }
}
