//! Backend identifiers and the per-backend operation-type registry.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// A named target capable of executing operations.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BackendId {
    /// The external coding-assistant command-line program
    Cli,
    /// Web-scraping server (page fetch, crawl)
    WebScraper,
    /// Browser-automation server
    Browser,
    /// Code-hosting server (repository search, file fetch)
    CodeHost,
    /// IDE diagnostics server
    Ide,
}

impl BackendId {
    /// The closed set of operation types this backend accepts.
    pub fn operation_types(&self) -> &'static [OperationType] {
        use OperationType::*;
        match self {
            BackendId::Cli => &[
                Chat,
                EditFile,
                CreateFile,
                AnalyzeProject,
                RunTests,
                ExecuteShell,
            ],
            BackendId::WebScraper => &[Scrape, Crawl],
            BackendId::Browser => &[Navigate, Screenshot, Click, Fill, EvaluateScript],
            BackendId::CodeHost => &[SearchRepository, FetchFile],
            BackendId::Ide => &[Diagnostics, ExecuteCode],
        }
    }

    pub fn supports(&self, operation: OperationType) -> bool {
        self.operation_types().contains(&operation)
    }
}

/// Operation-type tag.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OperationType {
    Chat,
    EditFile,
    CreateFile,
    AnalyzeProject,
    RunTests,
    ExecuteShell,
    Scrape,
    Crawl,
    Navigate,
    Screenshot,
    Click,
    Fill,
    EvaluateScript,
    SearchRepository,
    FetchFile,
    Diagnostics,
    ExecuteCode,
}

impl OperationType {
    /// Whether results of this type may be served from the result cache.
    ///
    /// Only read-only queries qualify. File mutations, shell and test runs,
    /// browser automation and IDE calls observe or change live state and
    /// always bypass the cache.
    pub fn cacheable_by_policy(&self) -> bool {
        matches!(
            self,
            OperationType::Chat
                | OperationType::AnalyzeProject
                | OperationType::Scrape
                | OperationType::Crawl
                | OperationType::SearchRepository
                | OperationType::FetchFile
        )
    }
}
