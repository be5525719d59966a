use serde::Serialize;

/// One company disclosure. Created by the listing scan with `report` unset,
/// completed once by the detail extractor, then written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub code: String,
    pub name: String,
    pub report: Option<String>,
    pub year: String,
    pub market_type: String,
}

impl Record {
    pub fn new(code: String, name: String, year: &str, market_type: &str) -> Self {
        Self {
            code,
            name,
            report: None,
            year: year.to_string(),
            market_type: market_type.to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.report.is_some()
    }
}
