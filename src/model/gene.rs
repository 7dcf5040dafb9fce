use crate::model::types::GeneId;
use serde::{Serialize, Deserialize};

/// Gene model: the stable id from the annotation and its display names.
///
/// `names[0]` is the display name written to junction output (gene_name when
/// the annotation provides one, else the stable id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gene {
    pub id: GeneId,
    pub key: String,
    pub names: Vec<String>,
}

impl Gene {
    pub fn new(id: GeneId, key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id,
            key: key.into(),
            names: vec![display_name.into()],
        }
    }

    /// Add an alias (deduped, blanks ignored).
    pub fn add_name(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
    }

    /// Name used when reporting overlapping genes.
    pub fn display_name(&self) -> &str {
        self.names.first().map(|s| s.as_str()).unwrap_or(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_first_name() {
        let mut g = Gene::new(0, "ENSG01", "BRCA1");
        g.add_name("ENSG01");
        g.add_name("BRCA1");
        g.add_name("  ");
        assert_eq!(g.names, vec!["BRCA1".to_string(), "ENSG01".to_string()]);
        assert_eq!(g.display_name(), "BRCA1");
        assert_eq!(g.key, "ENSG01");
    }

}
