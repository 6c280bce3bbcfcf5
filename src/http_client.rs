use anyhow::{Context, Result, ensure};
use reqwest::blocking::{Client, Response};
use std::time::Duration;

/// Create the blocking HTTP client used for XML-RPC requests
///
/// The same `timeout` bounds connecting and waiting for a response: module
/// upgrades run inside a single request and may take several minutes.
///
/// # Arguments
/// * `timeout` - Connection and request timeout
///
/// # Examples
/// ```no_run
/// use odoo_remote_update::http_client::rpc_client;
/// use std::time::Duration;
///
/// let client = rpc_client(Duration::from_secs(900)).expect("failed to create client");
/// ```
pub fn rpc_client(timeout: Duration) -> Result<Client> {
    ensure!(!timeout.is_zero(), "failed to create client: timeout must not be zero");

    Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to create XML-RPC HTTP client")
}

/// Handle HTTP response by checking status and extracting body
///
/// # Arguments
/// * `res` - The HTTP response to handle
/// * `context_msg` - Context message describing the request (e.g., "POST http://host/xmlrpc/2/common")
///
/// # Returns
/// * `Ok(String)` - The response body if the status is successful
/// * `Err` - If the status is not successful or reading the body fails
pub fn handle_http_response(res: Response, context_msg: &str) -> Result<String> {
    let status = res.status();
    let body = res.text().context("failed to read response body")?;

    ensure!(
        status.is_success(),
        "{context_msg} failed with status {status} and body: {body}"
    );

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_client_builds_with_timeout() {
        assert!(rpc_client(Duration::from_secs(900)).is_ok());
    }

    #[test]
    fn test_rpc_client_rejects_zero_timeout() {
        let result = rpc_client(Duration::ZERO);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("timeout must not be zero")
        );
    }
}
