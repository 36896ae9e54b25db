use super::value::Value;

/// One tabular result: column names plus rows of typed values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct View {
    pub header: Vec<String>,
    pub records: Vec<Vec<Value>>,
}

impl View {
    #[must_use]
    pub fn new(header: Vec<String>, records: Vec<Vec<Value>>) -> Self {
        Self { header, records }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.header
    }

    #[must_use]
    pub fn record_len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn field_index(&self, name: &str) -> Option<usize> {
        field_index(&self.header, name)
    }
}

/// Case-insensitive column lookup.
pub(crate) fn field_index(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|h| h.eq_ignore_ascii_case(name))
}
