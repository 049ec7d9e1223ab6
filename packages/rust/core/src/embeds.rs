//! Signed Metabase dashboard embeds.
//!
//! Each dashboard id in the dashboards file gets an HS256 token and an
//! embed URL; the mapping is written as JSON for the site templates.

use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use gregory_shared::{EmbedSettings, GregoryError, Result, Secret};

#[derive(Debug, Serialize)]
struct EmbedClaims {
    resource: Resource,
    params: Map<String, Value>,
    exp: i64,
}

#[derive(Debug, Serialize)]
struct Resource {
    dashboard: i64,
}

/// Sign an embed token for dashboard `id` expiring at `exp` (Unix seconds).
pub fn sign_dashboard(secret: &Secret, id: i64, exp: i64) -> Result<String> {
    let claims = EmbedClaims {
        resource: Resource { dashboard: id },
        params: Map::new(),
        exp,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.expose().as_bytes()),
    )
    .map_err(|e| GregoryError::Signing(format!("dashboard {id}: {e}")))
}

/// `{site}/embed/dashboard/{token}#bordered=true&titled=true`.
pub fn embed_url(site_url: &str, token: &str) -> String {
    format!(
        "{}/embed/dashboard/{token}#bordered=true&titled=true",
        site_url.trim_end_matches('/')
    )
}

/// Read dashboard ids from `path`: a JSON array of integers.
pub fn read_dashboards(path: &Path) -> Result<Vec<i64>> {
    let content = std::fs::read_to_string(path).map_err(|e| GregoryError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| GregoryError::parse(format!("{}: expected an array of dashboard ids: {e}", path.display())))
}

/// Sign every dashboard and write the `dashboard_<id>` → URL mapping.
///
/// Returns the number of embeds written. Callers check that the site URL
/// and secret are configured; missing either is a signing error here.
#[instrument(skip_all, fields(dashboards = %settings.dashboards_file.display()))]
pub fn generate_embeds(settings: &EmbedSettings, now: DateTime<Utc>) -> Result<usize> {
    let site_url = settings
        .site_url
        .as_deref()
        .ok_or_else(|| GregoryError::Signing("METABASE_SITE_URL is not set".into()))?;
    let secret = settings
        .secret
        .as_ref()
        .ok_or_else(|| GregoryError::Signing("METABASE_SECRET_KEY is not set".into()))?;

    let exp = TimeDelta::try_days(settings.expiry_days)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            GregoryError::config(format!("embed expiry of {} days is out of range", settings.expiry_days))
        })?
        .timestamp();

    let mut embeds = Map::new();
    for id in read_dashboards(&settings.dashboards_file)? {
        let token = sign_dashboard(secret, id, exp)?;
        embeds.insert(format!("dashboard_{id}"), Value::String(embed_url(site_url, &token)));
        debug!(id, "signed dashboard");
    }

    let output = &settings.output_file;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| GregoryError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(&embeds)
        .map_err(|e| GregoryError::parse(format!("embeds serialization failed: {e}")))?;
    std::fs::write(output, json).map_err(|e| GregoryError::io(output, e))?;

    info!(count = embeds.len(), path = %output.display(), "embeds written");
    Ok(embeds.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use std::path::PathBuf;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gregory-embeds-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn settings(dir: &Path) -> EmbedSettings {
        EmbedSettings {
            site_url: Some("https://metabase.gregory-ms.com/".into()),
            secret: Some(Secret::new("s3cret")),
            dashboards_file: dir.join("data/dashboards.json"),
            output_file: dir.join("data/embeds.json"),
            expiry_days: 30,
        }
    }

    #[test]
    fn token_carries_dashboard_and_expiry() {
        let exp = (Utc::now() + TimeDelta::days(30)).timestamp();
        let token = sign_dashboard(&Secret::new("s3cret"), 4, exp).unwrap();

        let decoded = decode::<Value>(
            &token,
            &DecodingKey::from_secret(b"s3cret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(decoded.claims["resource"]["dashboard"], 4);
        assert_eq!(decoded.claims["params"], serde_json::json!({}));
        assert_eq!(decoded.claims["exp"], exp);
    }

    #[test]
    fn url_shape() {
        assert_eq!(
            embed_url("https://mb.example.org/", "abc"),
            "https://mb.example.org/embed/dashboard/abc#bordered=true&titled=true"
        );
        assert_eq!(embed_url("https://mb.example.org", "abc"), embed_url("https://mb.example.org/", "abc"));
    }

    #[test]
    fn writes_mapping_per_dashboard() {
        let dir = temp_dir();
        let settings = settings(&dir);
        std::fs::create_dir_all(dir.join("data")).unwrap();
        std::fs::write(&settings.dashboards_file, "[1, 3]").unwrap();

        let count = generate_embeds(&settings, Utc::now()).unwrap();
        assert_eq!(count, 2);

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&settings.output_file).unwrap()).unwrap();
        let url = written["dashboard_3"].as_str().unwrap();
        assert!(url.starts_with("https://metabase.gregory-ms.com/embed/dashboard/"));
        assert!(url.ends_with("#bordered=true&titled=true"));
        assert!(written.get("dashboard_1").is_some());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_secret_is_signing_error() {
        let dir = temp_dir();
        let mut settings = settings(&dir);
        settings.secret = None;
        let err = generate_embeds(&settings, Utc::now()).unwrap_err();
        assert!(matches!(err, GregoryError::Signing(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn malformed_dashboards_file() {
        let dir = temp_dir();
        let settings = settings(&dir);
        std::fs::create_dir_all(dir.join("data")).unwrap();
        std::fs::write(&settings.dashboards_file, r#"{"not": "a list"}"#).unwrap();

        let err = generate_embeds(&settings, Utc::now()).unwrap_err();
        assert!(matches!(err, GregoryError::Parse { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn out_of_range_expiry_is_config_error() {
        let dir = temp_dir();
        let mut settings = settings(&dir);
        settings.expiry_days = i64::MAX;
        std::fs::create_dir_all(dir.join("data")).unwrap();
        std::fs::write(&settings.dashboards_file, "[1]").unwrap();

        let err = generate_embeds(&settings, Utc::now()).unwrap_err();
        assert!(matches!(err, GregoryError::Config { .. }));
        assert!(!settings.output_file.exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
