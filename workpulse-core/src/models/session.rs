use serde::{Deserialize, Serialize};

/// Caller-supplied metadata attached to an upload batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionMeta {
    pub employee_name: String,
    pub employee_pfp: String,
    pub date: String,
}

/// Row written to the sessions table, one per upload batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewSession {
    pub employee_name: String,
    pub employee_pfp: String,
    pub date: String,
    pub summary: String,
    pub verdict: Option<String>,
    pub score: Option<u8>,
    pub image_urls: Vec<String>,
}

impl NewSession {
    pub fn new(meta: SessionMeta, result: &AnalysisResult) -> Self {
        Self {
            employee_name: meta.employee_name,
            employee_pfp: meta.employee_pfp,
            date: meta.date,
            summary: result.summary.clone(),
            verdict: result.verdict.clone(),
            score: result.score,
            image_urls: result.image_urls.clone(),
        }
    }
}

/// Body returned from `POST /upload`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisResult {
    pub summary: String,
    pub verdict: Option<String>,
    pub score: Option<u8>,
    pub image_urls: Vec<String>,
}
