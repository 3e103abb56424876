use crate::fetch::client::HttpClient;
use async_trait::async_trait;

/// An [`HttpClient`] wrapper that appends an API key as a URL query parameter.
///
/// Used for the `dev_key` of a live-arrival descriptor: the key rides on the
/// URL while the request body carries the descriptor's form parameters.
pub struct UrlParam<'a, C: ?Sized> {
    pub inner: &'a C,
    pub param_name: &'a str,
    pub key: &'a str,
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for UrlParam<'_, C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.url_mut()
            .query_pairs_mut()
            .append_pair(self.param_name, self.key);
        self.inner.execute(req).await
    }
}
