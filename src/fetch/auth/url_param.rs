use crate::fetch::client::HttpClient;
use async_trait::async_trait;

/// An [`HttpClient`] wrapper that appends an API key as a URL query parameter.
///
/// `param_name` is the query parameter name (e.g. `"key"`) and `key` is its
/// value. The key is added at request time, so URLs recorded in spans and
/// errors upstream of this wrapper never carry it.
pub struct UrlParam<C> {
    pub inner: C,
    pub param_name: String,
    pub key: String,
}

impl<C> UrlParam<C> {
    pub fn new(inner: C, param_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            inner,
            param_name: param_name.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.url_mut()
            .query_pairs_mut()
            .append_pair(&self.param_name, &self.key);
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClient {
        seen: Mutex<Option<String>>,
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            *self.seen.lock().unwrap() = Some(req.url().to_string());
            let resp = http::Response::builder()
                .status(200)
                .body(vec![1u8])
                .unwrap();
            Ok(reqwest::Response::from(resp))
        }
    }

    #[tokio::test]
    async fn test_key_is_appended_as_query_param() {
        let client = UrlParam::new(RecordingClient::default(), "key", "s3cr3t");
        let req = reqwest::Request::new(
            reqwest::Method::GET,
            "https://feed.example/VehiclePositions.pb".parse().unwrap(),
        );

        client.execute(req).await.unwrap();

        let seen = client.inner.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen, "https://feed.example/VehiclePositions.pb?key=s3cr3t");
    }

    #[tokio::test]
    async fn test_existing_query_is_preserved() {
        let client = UrlParam::new(RecordingClient::default(), "key", "abc");
        let req = reqwest::Request::new(
            reqwest::Method::GET,
            "https://feed.example/feed?format=pb".parse().unwrap(),
        );

        client.execute(req).await.unwrap();

        let seen = client.inner.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen, "https://feed.example/feed?format=pb&key=abc");
    }
}
