use std::sync::OnceLock;

use regex::Regex;

use crate::error::HarvestError;

pub const GENUS_PLACEHOLDER: &str = "genus";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Genus,
}

/// A query template validated once and rendered per genus.
///
/// `{genus}` is replaced by the genus name, `{{` and `}}` produce literal
/// braces. The genus string is inserted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    segments: Vec<Segment>,
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").expect("template token regex is valid")
    })
}

impl QueryTemplate {
    pub fn parse(text: &str) -> Result<Self, HarvestError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0usize;
        let mut placeholders = 0usize;

        for captures in token_regex().captures_iter(text) {
            let token = captures
                .get(0)
                .ok_or_else(|| HarvestError::Template("empty template token".to_string()))?;
            literal.push_str(&text[last..token.start()]);
            last = token.end();
            match token.as_str() {
                "{{" => literal.push('{'),
                "}}" => literal.push('}'),
                "{" | "}" => {
                    return Err(HarvestError::Template(format!(
                        "unbalanced '{}' at byte {}",
                        token.as_str(),
                        token.start()
                    )));
                }
                _ => {
                    let name = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
                    if name != GENUS_PLACEHOLDER {
                        return Err(HarvestError::Template(format!(
                            "unknown placeholder {{{name}}}"
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Genus);
                    placeholders += 1;
                }
            }
        }
        literal.push_str(&text[last..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if placeholders == 0 {
            return Err(HarvestError::Template(format!(
                "template has no {{{GENUS_PLACEHOLDER}}} placeholder"
            )));
        }
        Ok(Self { segments })
    }

    pub fn render(&self, genus: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Genus => out.push_str(genus),
            }
        }
        out
    }
}

pub fn build_query(template: &str, genus: &str) -> Result<String, HarvestError> {
    Ok(QueryTemplate::parse(template)?.render(genus))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn renders_genus_and_literal_braces() {
        let template = "SELECT ?smiles WHERE {{ ?taxon rdfs:label \"{genus}\"@en . }}";
        let query = build_query(template, "Papaver").unwrap();
        assert_eq!(
            query,
            "SELECT ?smiles WHERE { ?taxon rdfs:label \"Papaver\"@en . }"
        );
    }

    #[test]
    fn repeated_placeholder_is_filled_everywhere() {
        let query = build_query("{genus}/{genus}", "Vinca").unwrap();
        assert_eq!(query, "Vinca/Vinca");
    }

    #[test]
    fn missing_placeholder_is_a_template_error() {
        let err = build_query("SELECT * WHERE {{ ?s ?p ?o }}", "Rosa").unwrap_err();
        assert_matches!(err, HarvestError::Template(_));
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let err = QueryTemplate::parse("{genus} {family}").unwrap_err();
        assert_matches!(err, HarvestError::Template(msg) if msg.contains("family"));
    }

    #[test]
    fn single_brace_is_rejected() {
        let err = QueryTemplate::parse("SELECT * WHERE { {genus} }").unwrap_err();
        assert_matches!(err, HarvestError::Template(msg) if msg.contains("unbalanced"));
    }
}
