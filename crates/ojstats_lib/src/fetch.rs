//! The platform data fetcher: parallel, bounded-timeout calls to the upstream OJ API.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt as _;
use mkenv::prelude::*;
use serde::Deserialize;

use crate::models::{OjUserData, PlatformData};
use crate::platform::Platform;

/// The shape of an upstream API response: `GET {base}/{platform_code}/{username}`.
#[derive(Deserialize, Debug)]
struct ApiResponse {
    error: bool,
    data: Option<ApiData>,
}

#[derive(Deserialize, Debug)]
struct ApiData {
    solved: Option<i32>,
    submissions: Option<i32>,
}

/// The client used to fetch per-platform statistics from the upstream OJ API.
///
/// Each call is bound by a hard timeout, and the fan-out over platforms is bounded
/// by a fixed concurrency limit. A timeout, a non-2xx status, an `error: true`
/// payload, or a malformed body all degrade to "no data" for that platform only.
pub struct OjClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    concurrency: usize,
}

impl OjClient {
    /// Creates a new client, with the provided upstream base URL, per-call timeout,
    /// and fan-out concurrency bound.
    pub fn new(base_url: String, timeout: Duration, concurrency: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Creates a new client from the global library environment.
    pub fn from_env() -> Self {
        let env = crate::env();
        Self::new(
            env.oj_api_url.get(),
            env.fetch_timeout.get(),
            env.fetch_concurrency.get(),
        )
    }

    /// Fetches the statistics of a single platform, or `None` if the platform
    /// returned no usable data.
    pub async fn fetch_platform(&self, platform: Platform, username: &str) -> Option<PlatformData> {
        let url = format!("{}/{}/{}", self.base_url, platform.code(), username);
        tracing::debug!("fetching {platform} data for `{username}`: {url}");

        let response = match self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("{platform} call failed for `{username}`: {e}");
                return None;
            }
        };

        let body = match response.json::<ApiResponse>().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("{platform} returned a malformed payload for `{username}`: {e}");
                return None;
            }
        };

        parse_platform_data(platform, body)
    }
}

/// The source of aggregated user statistics consumed by the profile read path.
///
/// The returned future must own its state and be `Send`, so the read paths built on a
/// source stay spawnable as background tasks.
pub trait UserDataSource: Send + Sync {
    /// Fetches the statistics of all the provided bindings and aggregates the
    /// results, summing the totals over exactly the platforms that returned data.
    fn fetch_user_data(
        &self,
        bindings: &[(Platform, String)],
    ) -> impl Future<Output = OjUserData> + Send;
}

impl UserDataSource for OjClient {
    /// Fetches the bindings concurrently, with the client's parallelism bound.
    ///
    /// Failed platforms are skipped, never aborting the other calls. The refresh
    /// cadence is controlled by the caller: no retry happens here.
    async fn fetch_user_data(&self, bindings: &[(Platform, String)]) -> OjUserData {
        // Owned items only: a future borrowing the iterated pair would not be
        // spawnable through the fan-out.
        let results: Vec<_> = futures::stream::iter(bindings.to_vec())
            .map(|(platform, username)| async move {
                self.fetch_platform(platform, &username).await
            })
            .buffer_unordered(self.concurrency)
            .filter_map(futures::future::ready)
            .collect()
            .await;

        // Keep the output in platform declaration order, whatever the completion order.
        let mut results = results;
        results.sort_by_key(|data| Platform::ALL.iter().position(|p| *p == data.platform));

        OjUserData::from_results(results)
    }
}

fn parse_platform_data(platform: Platform, body: ApiResponse) -> Option<PlatformData> {
    match body {
        ApiResponse {
            error: false,
            data: Some(data),
        } => Some(PlatformData {
            platform,
            solved: data.solved.unwrap_or(0),
            submitted: data.submissions.unwrap_or(0),
        }),
        _ => {
            tracing::warn!("{platform} API reported an error or returned no data");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_payload_is_parsed() {
        let body: ApiResponse =
            serde_json::from_str(r#"{"error":false,"data":{"solved":25,"submissions":50}}"#)
                .unwrap();
        let data = parse_platform_data(Platform::Luogu, body).unwrap();
        assert_eq!(data.solved, 25);
        assert_eq!(data.submitted, 50);
    }

    #[test]
    fn error_payload_counts_as_no_data() {
        let body: ApiResponse =
            serde_json::from_str(r#"{"error":true,"data":{"solved":25,"submissions":50}}"#)
                .unwrap();
        assert_eq!(parse_platform_data(Platform::Luogu, body), None);

        let body: ApiResponse = serde_json::from_str(r#"{"error":false}"#).unwrap();
        assert_eq!(parse_platform_data(Platform::Codeforces, body), None);
    }

    #[test]
    fn extra_payload_fields_are_ignored() {
        // The upstream sometimes attaches a `solvedList` to the payload.
        let body: ApiResponse = serde_json::from_str(
            r#"{"error":false,"data":{"solved":3,"submissions":9,"solvedList":["a","b","c"]}}"#,
        )
        .unwrap();
        let data = parse_platform_data(Platform::Nowcoder, body).unwrap();
        assert_eq!((data.solved, data.submitted), (3, 9));
    }

    #[tokio::test]
    async fn unreachable_upstream_degrades_to_no_data() {
        // Nothing listens on this address, so every platform resolves to "no data"
        // and the aggregate stays zero-valued.
        let client = OjClient::new(
            "http://127.0.0.1:9".to_owned(),
            Duration::from_millis(200),
            4,
        );
        let bindings = vec![
            (Platform::Luogu, "alice".to_owned()),
            (Platform::Codeforces, "alice_cf".to_owned()),
        ];
        let data = client.fetch_user_data(&bindings).await;
        assert_eq!(data, OjUserData::empty());
    }

    #[tokio::test]
    async fn fan_out_is_spawnable() {
        let client = std::sync::Arc::new(OjClient::new(
            "http://127.0.0.1:9".to_owned(),
            Duration::from_millis(200),
            4,
        ));
        // The fan-out future crosses a task boundary, like the scheduler's loops do.
        let handle = tokio::spawn(async move {
            let bindings = vec![(Platform::Luogu, "alice".to_owned())];
            client.fetch_user_data(&bindings).await
        });
        assert_eq!(handle.await.unwrap(), OjUserData::empty());
    }
}
