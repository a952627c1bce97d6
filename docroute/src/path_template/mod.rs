// Path templates for synthesized routes, like `/users/{id}`

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    pub raw: String,
    pub segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Literal(String),
    Param(String),
}

impl PathTemplate {
    /// Build a template from literal segments, e.g. `["settings", "users"]`.
    /// Pass `param` to append a trailing `{param}` segment.
    pub fn from_parts(literals: &[&str], param: Option<&str>) -> Self {
        let mut segments: Vec<PathSegment> = literals
            .iter()
            .map(|s| PathSegment::Literal(s.to_string()))
            .collect();
        if let Some(name) = param {
            segments.push(PathSegment::Param(name.to_string()));
        }
        let raw = render_raw(&segments);
        PathTemplate { raw, segments }
    }

    /// Match a concrete request path, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = split_path(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                PathSegment::Literal(lit) if lit == part => {}
                PathSegment::Literal(_) => return None,
                PathSegment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn render_raw(segments: &[PathSegment]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    segments
        .iter()
        .map(|s| match s {
            PathSegment::Literal(lit) => format!("/{lit}"),
            PathSegment::Param(name) => format!("/{{{name}}}"),
        })
        .collect()
}
