use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::{RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};

use crate::{core::constants::USER_AGENT, Error, Result};

/// Shared async HTTP client for every upstream API
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(5))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(8)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
});

/// Longest upstream error body (in chars) kept in [`Error::Upstream`]
const MAX_ERROR_BODY: usize = 512;

fn transport_error(e: reqwest::Error, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::Timeout(timeout)
    } else {
        Error::Network(e)
    }
}

async fn send(request: RequestBuilder, timeout: Duration) -> Result<Response> {
    let response = request.timeout(timeout).send().await.map_err(|e| transport_error(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let body: String = text.chars().take(MAX_ERROR_BODY).collect();
        return Err(Error::Upstream {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

async fn read_json<T: DeserializeOwned>(response: Response, timeout: Duration) -> Result<T> {
    let bytes = response.bytes().await.map_err(|e| transport_error(e, timeout))?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub async fn get_json<T: DeserializeOwned>(
    url: &str,
    query: &[(&str, String)],
    timeout: Duration,
) -> Result<T> {
    let response = send(HTTP_CLIENT.get(url).query(query), timeout).await?;
    read_json(response, timeout).await
}

pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
    url: &str,
    body: &B,
    timeout: Duration,
) -> Result<T> {
    let response = send(HTTP_CLIENT.post(url).json(body), timeout).await?;
    read_json(response, timeout).await
}

pub async fn post_form<T: DeserializeOwned>(
    url: &str,
    form: &[(&str, &str)],
    timeout: Duration,
) -> Result<T> {
    let response = send(HTTP_CLIENT.post(url).form(form), timeout).await?;
    read_json(response, timeout).await
}

/// Raw body, for binary feeds
pub async fn get_bytes(url: &str, timeout: Duration) -> Result<Vec<u8>> {
    let response = send(HTTP_CLIENT.get(url), timeout).await?;
    let bytes = response.bytes().await.map_err(|e| transport_error(e, timeout))?;
    Ok(bytes.to_vec())
}
