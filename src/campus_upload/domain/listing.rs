//! ポータル画面側で使う一覧ヘルパー (落とし物/拾得物タブと検索、苦情のステータス集計)。
//! Library-only: no HTTP route serves these; clients link the crate and call them directly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostingKind {
    Lost,
    Found,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostingTab {
    #[default]
    All,
    Lost,
    Found,
}

impl PostingTab {
    fn admits(self, kind: PostingKind) -> bool {
        match self {
            PostingTab::All => true,
            PostingTab::Lost => kind == PostingKind::Lost,
            PostingTab::Found => kind == PostingKind::Found,
        }
    }
}

/// Lost/found posting as listed by the portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PostingKind,
    pub item_name: String,
    pub description: String,
    pub location: String,
    pub contact_name: String,
    pub contact_email: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// タブで種別を絞り込み、検索語 (大文字小文字を区別しない) で品名か説明文を部分一致検索する
pub fn filter_postings<'a>(items: &'a [Posting], tab: PostingTab, query: &str) -> Vec<&'a Posting> {
    let query = query.to_lowercase();
    items
        .iter()
        .filter(|item| tab.admits(item.kind))
        .filter(|item| {
            query.is_empty()
                || item.item_name.to_lowercase().contains(&query)
                || item.description.to_lowercase().contains(&query)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplaintStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintSummary {
    pub id: String,
    pub title: String,
    pub status: ComplaintStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub resolved: usize,
}

impl StatusCounts {
    pub fn tally<'a>(complaints: impl IntoIterator<Item = &'a ComplaintSummary>) -> Self {
        complaints.into_iter().fold(Self::default(), |mut counts, complaint| {
            match complaint.status {
                ComplaintStatus::Pending => counts.pending += 1,
                ComplaintStatus::InProgress => counts.in_progress += 1,
                ComplaintStatus::Resolved => counts.resolved += 1,
            }
            counts
        })
    }
}
