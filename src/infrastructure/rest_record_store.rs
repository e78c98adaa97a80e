use crate::domain::models::{BossClearRecord, PitchedItemRecord};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_codec::{
    decode_boss_clear, decode_pitched_item, decode_rows, encode_boss_clear, encode_pitched_item,
    BossClearRow, PitchedItemRow,
};
use crate::infrastructure::record_store::{RecordFilter, RecordKind, RecordStore};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Record store reached over HTTP:
/// `GET {base}/users/{user}/{kind}[?week=KEY]` and `PUT {base}/users/{user}/{kind}`.
#[derive(Debug, Clone)]
pub struct RestRecordStore {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl RestRecordStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid store base url: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(
                "store base url cannot be a base".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| InfraError::InvalidConfig(format!("cannot build http client: {error}")))?;
        Ok(Self {
            client,
            base_url,
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = Some(api_key).filter(|key| !key.trim().is_empty());
        self
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Remote(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn http_error(status: StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("record store error: http {}", status.as_u16())
        } else {
            format!("record store error: http {}; body={body}", status.as_u16())
        };
        InfraError::Remote(message)
    }

    pub(crate) fn collection_endpoint(
        &self,
        user_id: &str,
        kind: RecordKind,
        filter: RecordFilter,
    ) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("store base url cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("users");
            segments.push(user_id.trim());
            segments.push(kind.as_str());
        }
        if let Some(week) = filter.week {
            url.query_pairs_mut().append_pair("week", &week.to_string());
        }
        Ok(url)
    }

    async fn read_values(
        &self,
        user_id: &str,
        kind: RecordKind,
        filter: RecordFilter,
    ) -> Result<Vec<Value>, InfraError> {
        Self::ensure_non_empty(user_id, "user id")?;
        let endpoint = self.collection_endpoint(user_id, kind, filter)?;

        let mut request = self.client.get(endpoint);
        if let Some(api_key) = self.api_key.as_deref() {
            request = request.bearer_auth(api_key);
        }
        let response = request.send().await.map_err(|error| {
            InfraError::Remote(format!("network error while reading {}: {error}", kind.as_str()))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body = response.text().await.map_err(|error| {
            InfraError::Remote(format!("failed reading {} response: {error}", kind.as_str()))
        })?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&body).map_err(|error| {
            InfraError::Remote(format!("invalid {} payload: {error}; body={body}", kind.as_str()))
        })
    }

    async fn read_rows<R: DeserializeOwned>(
        &self,
        user_id: &str,
        kind: RecordKind,
        filter: RecordFilter,
    ) -> Result<Vec<R>, InfraError> {
        let values = self.read_values(user_id, kind, filter).await?;
        Ok(values
            .into_iter()
            .enumerate()
            .filter_map(|(position, value)| match serde_json::from_value(value) {
                Ok(row) => Some(row),
                Err(error) => {
                    log::warn!("skipping malformed {} row {position}: {error}", kind.as_str());
                    None
                }
            })
            .collect())
    }

    /// Replaces the collection with `rows` plus every stored row that does not
    /// decode, so a write never drops data a read could not show.
    async fn write_rows<R, T>(
        &self,
        user_id: &str,
        kind: RecordKind,
        rows: &[R],
        decode: impl Fn(&R) -> Result<T, InfraError> + Send,
    ) -> Result<(), InfraError>
    where
        R: Serialize + DeserializeOwned + Sync,
    {
        let stored = self.read_values(user_id, kind, RecordFilter::all()).await?;
        let kept = undecodable_values(stored, decode);
        if !kept.is_empty() {
            log::warn!("keeping {} undecodable {} rows", kept.len(), kind.as_str());
        }
        let mut payload = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        payload.extend(kept);
        self.put_values(user_id, kind, &payload).await
    }

    async fn put_values(
        &self,
        user_id: &str,
        kind: RecordKind,
        rows: &[Value],
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(user_id, "user id")?;
        let endpoint = self.collection_endpoint(user_id, kind, RecordFilter::all())?;

        let mut request = self.client.put(endpoint).json(rows);
        if let Some(api_key) = self.api_key.as_deref() {
            request = request.bearer_auth(api_key);
        }
        let response = request.send().await.map_err(|error| {
            InfraError::Remote(format!("network error while writing {}: {error}", kind.as_str()))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Remote(format!("failed reading {} write response: {error}", kind.as_str()))
        })?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        Ok(())
    }
}

fn undecodable_values<R, T>(
    values: Vec<Value>,
    decode: impl Fn(&R) -> Result<T, InfraError>,
) -> Vec<Value>
where
    R: DeserializeOwned,
{
    values
        .into_iter()
        .filter(|value| {
            serde_json::from_value::<R>(value.clone())
                .map_err(InfraError::from)
                .and_then(|row| decode(&row))
                .is_err()
        })
        .collect()
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn read_boss_clears(
        &self,
        user_id: &str,
        filter: RecordFilter,
    ) -> Result<Vec<BossClearRecord>, InfraError> {
        let rows: Vec<BossClearRow> = self.read_rows(user_id, RecordKind::BossClears, filter).await?;
        // The server may ignore the week parameter, so filter again locally.
        Ok(decode_rows(&rows, decode_boss_clear, "boss clear")
            .into_iter()
            .filter(|record| filter.matches(&record.week_key))
            .collect())
    }

    async fn write_boss_clears(
        &self,
        user_id: &str,
        records: &[BossClearRecord],
    ) -> Result<(), InfraError> {
        let rows: Vec<BossClearRow> = records.iter().map(encode_boss_clear).collect();
        self.write_rows(user_id, RecordKind::BossClears, &rows, decode_boss_clear)
            .await
    }

    async fn read_pitched_items(
        &self,
        user_id: &str,
        filter: RecordFilter,
    ) -> Result<Vec<PitchedItemRecord>, InfraError> {
        let rows: Vec<PitchedItemRow> =
            self.read_rows(user_id, RecordKind::PitchedItems, filter).await?;
        Ok(decode_rows(&rows, decode_pitched_item, "pitched item")
            .into_iter()
            .filter(|record| filter.matches(&record.week_key))
            .collect())
    }

    async fn write_pitched_items(
        &self,
        user_id: &str,
        records: &[PitchedItemRecord],
    ) -> Result<(), InfraError> {
        let rows: Vec<PitchedItemRow> = records.iter().map(encode_pitched_item).collect();
        self.write_rows(user_id, RecordKind::PitchedItems, &rows, decode_pitched_item)
            .await
    }
}
