//! Authenticated request command.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::{Context as _, Result};
use habitat_auth::{GatewayRequest, Method};
use std::collections::BTreeMap;
use tracing::debug;

/// Split a `Name: value` header argument.
fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("Header must look like 'Name: value', got {:?}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Header name is empty in {:?}", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Send one authenticated request and print the response.
pub async fn fetch(
    ctx: &Context,
    target: &str,
    method: &str,
    body: Option<String>,
    headers: &[String],
) -> Result<()> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method {:?}", method))?;

    let mut request = GatewayRequest::new(method, target);
    for raw in headers {
        let (name, value) = parse_header(raw)?;
        request = request.header(name, value);
    }
    if let Some(body) = body {
        request = request.body(body);
    }

    let manager = ctx.session_manager()?;
    let response = manager.fetch(request).await?;
    debug!(status = %response.status, "Request finished");

    match ctx.format {
        OutputFormat::Text => {
            if !response.is_success() {
                eprintln!("HTTP {}", response.status);
            }
            println!("{}", response.text());
        }
        OutputFormat::Json => {
            let headers: BTreeMap<&str, String> = response
                .headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response
                .json::<serde_json::Value>()
                .unwrap_or_else(|_| serde_json::Value::String(response.text().into_owned()));
            output::print_json(&serde_json::json!({
                "status": response.status.as_u16(),
                "headers": headers,
                "body": body,
            }))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let (name, value) = parse_header("Accept: application/json").unwrap();
        assert_eq!(name, "Accept");
        assert_eq!(value, "application/json");
    }

    #[test]
    fn test_parse_header_keeps_colons_in_value() {
        let (name, value) = parse_header("X-Target:https://node.example").unwrap();
        assert_eq!(name, "X-Target");
        assert_eq!(value, "https://node.example");
    }

    #[test]
    fn test_parse_header_rejects_malformed() {
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }
}
