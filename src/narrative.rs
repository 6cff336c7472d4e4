//! Persistence for the dashboard's editable narrative blocks: the free-text
//! insight list and the structured "key changes" list.
//!
//! Reads never fail. A missing, unreadable or malformed entry falls back to
//! the board's defaults, and writes go to the primary store only when it is
//! configured, otherwise to the local fallback.

use crate::error::{DashboardError, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const INSIGHTS_KEY: &str = "dashboard:insights";
pub const CHANGES_KEY: &str = "dashboard:changes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChangeItem {
    pub title: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ChangeItem {
    pub fn new(title: &str, value: &str) -> Self {
        Self {
            title: title.to_string(),
            value: value.to_string(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// A stored payload stamped with the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedEntry<T> {
    pub saved_at: DateTime<Utc>,
    pub data: T,
}

pub trait KeyValueStore {
    /// Whether the store has what it needs (credentials, a location) to be used.
    fn is_configured(&self) -> bool {
        true
    }

    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn set(&mut self, key: &str, value: Value) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Value>,
    configured: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            configured: true,
        }
    }

    /// A store that reports itself as not configured, like a remote store
    /// whose credentials are absent.
    pub fn unconfigured() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Local fallback store: one JSON object file mapping keys to values.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, Value>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let json = std::fs::read_to_string(&self.path)?;
        if json.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&json)?)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value);
        std::fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

/// Values shown when nothing has been saved yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeDefaults {
    pub insights: Vec<String>,
    pub changes: Vec<ChangeItem>,
}

const REPORT_INSIGHTS: [&str; 6] = [
    "**STE 배당금 18,000백만원 수취 예정** (2026년 11월): 영국 정부의 STE 감자 승인 절차가 진행 중이며, 승인 완료 즉시 배당금 수취 후 본사 차입금 전액 상환(18,000백만원) 계획. 이는 재무구조 개선의 핵심 포인트.",
    "**비용 효율화 3,309백만원 달성**: 비용지출이 24,631백만원에서 21,322백만원으로 **13.4% 감소**. 특히 지급수수료 1,661백만원 절감과 기타비용 1,572백만원 감소가 주요 성과. 인건비는 274백만원 증가했으나 전체적으로 비용 구조 개선.",
    "**현금잔액 안정적 관리**: 기말잔액이 7,142백만원에서 4,488백만원으로 감소했으나, 이는 STE 지분 매입(25년)과 본사 차입금 상환(26년) 등 전략적 자금 운용의 결과. 영업 활동 기반 현금 창출력은 견조한 수준 유지.",
    "**매출수금 구조 변화**: 전체 매출수금은 23,264백만원에서 23,220백만원으로 소폭 감소(-44백만원). 하지만 온라인(US+EU) 채널이 798백만원 성장(20,643→21,441)하며 주요 성장 동력으로 부상. 라이선스 매출 감소(-599백만원)는 일회성 요인으로 판단.",
    "**운전자본 효율화 진행 중**: 재고자산이 4,942백만원에서 2,504백만원으로 **49% 감소**하며 현금화 속도 개선. 운전자본은 534백만원에서 -1,691백만원으로 변동했으나, 이는 재고 최적화 정책의 결과로 긍정적 평가.",
    "**물품대 지출 1,459백만원 절감**: 6,011백만원에서 4,552백만원으로 **24% 감소**. 광고선전비는 197백만원 증가했으나, 전반적인 지출 관리는 효과적으로 운영되고 있음.",
];

// (title, value, description)
const REPORT_CHANGES: [(&str, &str, &str); 6] = [
    (
        "STE 배당금 수취",
        "18,000백만원 (2026년 11월 예정)",
        "영국 정부 STE 감자 승인 후 배당금 수취. 승인 완료 즉시 본사 차입금 전액 상환 진행",
    ),
    (
        "비용 효율화 성과",
        "3,309백만원 절감 (24,631 → 21,322)",
        "지급수수료 1,661백만원, 기타비용 1,572백만원 절감. 13.4% 비용 구조 개선",
    ),
    (
        "온라인 채널 성장",
        "798백만원 증가 (20,643 → 21,441)",
        "온라인(US+EU) 매출 지속 성장. 전체 매출수금의 92% 차지하며 핵심 채널로 확립",
    ),
    (
        "재고자산 효율화",
        "2,438백만원 감소 (4,942 → 2,504)",
        "49% 재고 감축으로 현금화 속도 개선. 운전자본 최적화 정책 성과",
    ),
    (
        "본사 차입금 상환",
        "18,000백만원 (2026년 12월 예정)",
        "STE 배당금 수취 후 F&F(OC) 차입금 전액 상환. 재무구조 개선 완료 예정",
    ),
    (
        "물품대 지출 절감",
        "1,459백만원 개선 (-6,011 → -4,552)",
        "24% 지출 감소. 구매 및 재고 관리 효율화 성과",
    ),
];

impl NarrativeDefaults {
    /// The narrative shipped with the 2026 monthly report.
    pub fn report() -> Self {
        Self {
            insights: REPORT_INSIGHTS.iter().map(|s| s.to_string()).collect(),
            changes: REPORT_CHANGES
                .iter()
                .map(|(title, value, description)| {
                    ChangeItem::new(title, value).with_description(description)
                })
                .collect(),
        }
    }
}

pub struct NarrativeBoard {
    primary: Box<dyn KeyValueStore>,
    fallback: Box<dyn KeyValueStore>,
    defaults: NarrativeDefaults,
}

impl NarrativeBoard {
    pub fn new(primary: Box<dyn KeyValueStore>, fallback: Box<dyn KeyValueStore>) -> Self {
        Self {
            primary,
            fallback,
            defaults: NarrativeDefaults::report(),
        }
    }

    pub fn with_defaults(mut self, defaults: NarrativeDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn uses_primary(&self) -> bool {
        self.primary.is_configured()
    }

    fn store(&self) -> &dyn KeyValueStore {
        if self.primary.is_configured() {
            self.primary.as_ref()
        } else {
            self.fallback.as_ref()
        }
    }

    fn store_mut(&mut self) -> &mut dyn KeyValueStore {
        if self.primary.is_configured() {
            self.primary.as_mut()
        } else {
            self.fallback.as_mut()
        }
    }

    pub fn insights(&self) -> Vec<String> {
        self.read(INSIGHTS_KEY)
            .unwrap_or_else(|| self.defaults.insights.clone())
    }

    pub fn changes(&self) -> Vec<ChangeItem> {
        self.read(CHANGES_KEY)
            .unwrap_or_else(|| self.defaults.changes.clone())
    }

    pub fn save_insights(&mut self, insights: &[String]) -> Result<DateTime<Utc>> {
        self.write(INSIGHTS_KEY, insights)
    }

    pub fn save_changes(&mut self, changes: &[ChangeItem]) -> Result<DateTime<Utc>> {
        if let Some(item) = changes.iter().find(|c| c.title.trim().is_empty()) {
            return Err(DashboardError::StoreError(format!(
                "change item with value '{}' has no title",
                item.value
            )));
        }
        self.write(CHANGES_KEY, changes)
    }

    /// Stored value under `key`, accepting both the stamped envelope and a
    /// bare payload written by other clients.
    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = match self.store().get(key) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("No saved value for {}, using defaults", key);
                return None;
            }
            Err(e) => {
                warn!("Failed to read {}: {}; using defaults", key, e);
                return None;
            }
        };

        if let Ok(entry) = serde_json::from_value::<SavedEntry<T>>(value.clone()) {
            debug!("Loaded {} saved at {}", key, entry.saved_at);
            return Some(entry.data);
        }
        match serde_json::from_value::<T>(value) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Malformed value under {}: {}; using defaults", key, e);
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&mut self, key: &str, data: &T) -> Result<DateTime<Utc>> {
        let saved_at = Utc::now();
        let value = serde_json::to_value(SavedEntry { saved_at, data })?;
        self.store_mut().set(key, value)?;
        debug!("Saved {} at {}", key, saved_at);
        Ok(saved_at)
    }
}

/// Presentation tone of an emphasised span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tone {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmphasisSpan {
    pub text: String,
    pub bold: bool,
    pub tone: Tone,
}

/// Splits insight text on `**bold**` markers. Bold spans starting with `+`
/// are positive, with `-` negative. An unterminated marker is kept as text.
pub fn emphasis_spans(text: &str) -> Vec<EmphasisSpan> {
    let mut spans = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        let Some(len) = after.find("**") else {
            break;
        };

        push_plain(&mut spans, &rest[..start]);
        let content = &after[..len];
        let tone = if content.starts_with('-') {
            Tone::Negative
        } else if content.starts_with('+') {
            Tone::Positive
        } else {
            Tone::Neutral
        };
        spans.push(EmphasisSpan {
            text: content.to_string(),
            bold: true,
            tone,
        });
        rest = &after[len + 2..];
    }
    push_plain(&mut spans, rest);

    spans
}

fn push_plain(spans: &mut Vec<EmphasisSpan>, plain: &str) {
    if !plain.is_empty() {
        spans.push(EmphasisSpan {
            text: plain.to_string(),
            bold: false,
            tone: Tone::Neutral,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> NarrativeDefaults {
        NarrativeDefaults {
            insights: vec!["Cash position stable".to_string()],
            changes: vec![ChangeItem::new("Loan repayment", "18,000")],
        }
    }

    #[test]
    fn test_defaults_when_nothing_saved() {
        let board = NarrativeBoard::new(
            Box::new(MemoryStore::new()),
            Box::new(MemoryStore::new()),
        )
        .with_defaults(defaults());

        assert_eq!(board.insights(), defaults().insights);
        assert_eq!(board.changes(), defaults().changes);
    }

    #[test]
    fn test_board_starts_with_report_narrative() {
        let board = NarrativeBoard::new(
            Box::new(MemoryStore::new()),
            Box::new(MemoryStore::new()),
        );

        let insights = board.insights();
        assert_eq!(insights.len(), 6);
        assert!(insights[1].starts_with("**비용 효율화 3,309백만원 달성**"));
        let spans = emphasis_spans(&insights[0]);
        assert!(spans[0].bold);

        let changes = board.changes();
        assert_eq!(changes.len(), 6);
        assert_eq!(changes[0].title, "STE 배당금 수취");
        assert!(changes.iter().all(|c| c.description.is_some()));
        assert_eq!(NarrativeDefaults::report(), NarrativeDefaults { insights, changes });
    }

    #[test]
    fn test_save_and_reload_through_primary() {
        let mut board = NarrativeBoard::new(
            Box::new(MemoryStore::new()),
            Box::new(MemoryStore::new()),
        );
        assert!(board.uses_primary());

        let changes = vec![ChangeItem::new("Cost savings", "3,309").with_description("13.4% lower")];
        board.save_changes(&changes).unwrap();
        board
            .save_insights(&["**+798** online growth".to_string()])
            .unwrap();

        assert_eq!(board.changes(), changes);
        assert_eq!(board.insights(), ["**+798** online growth"]);
    }

    #[test]
    fn test_unconfigured_primary_uses_fallback() {
        let mut board = NarrativeBoard::new(
            Box::new(MemoryStore::unconfigured()),
            Box::new(MemoryStore::new()),
        )
        .with_defaults(defaults());
        assert!(!board.uses_primary());

        board.save_insights(&["local note".to_string()]).unwrap();
        assert_eq!(board.insights(), ["local note"]);
    }

    #[test]
    fn test_bare_and_malformed_values() {
        let mut primary = MemoryStore::new();
        primary
            .set(INSIGHTS_KEY, json!(["written by another client"]))
            .unwrap();
        primary.set(CHANGES_KEY, json!({"unexpected": true})).unwrap();

        let board = NarrativeBoard::new(Box::new(primary), Box::new(MemoryStore::new()))
            .with_defaults(defaults());
        assert_eq!(board.insights(), ["written by another client"]);
        assert_eq!(board.changes(), defaults().changes);
    }

    #[test]
    fn test_untitled_change_is_rejected() {
        let mut board = NarrativeBoard::new(
            Box::new(MemoryStore::new()),
            Box::new(MemoryStore::new()),
        );
        let result = board.save_changes(&[ChangeItem::new(" ", "100")]);
        assert!(matches!(result, Err(DashboardError::StoreError(_))));
    }

    #[test]
    fn test_json_file_store_persists_between_instances() {
        let path = std::env::temp_dir().join(format!("narrative-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut store = JsonFileStore::new(&path);
        assert_eq!(store.get(INSIGHTS_KEY).unwrap(), None);
        store.set(INSIGHTS_KEY, json!(["a"])).unwrap();
        store.set(CHANGES_KEY, json!([])).unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get(INSIGHTS_KEY).unwrap(), Some(json!(["a"])));
        assert_eq!(reopened.get(CHANGES_KEY).unwrap(), Some(json!([])));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_emphasis_spans() {
        let spans = emphasis_spans("Sales **-44** vs online **+798** and **steady** cash");
        let summary: Vec<(&str, bool, Tone)> = spans
            .iter()
            .map(|s| (s.text.as_str(), s.bold, s.tone))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("Sales ", false, Tone::Neutral),
                ("-44", true, Tone::Negative),
                (" vs online ", false, Tone::Neutral),
                ("+798", true, Tone::Positive),
                (" and ", false, Tone::Neutral),
                ("steady", true, Tone::Neutral),
                (" cash", false, Tone::Neutral),
            ]
        );
    }

    #[test]
    fn test_unterminated_marker_stays_plain() {
        let spans = emphasis_spans("**bold** then **open");
        assert_eq!(spans.len(), 2);
        assert!(spans[0].bold);
        assert_eq!(spans[1].text, " then **open");
        assert!(!spans[1].bold);
    }
}
