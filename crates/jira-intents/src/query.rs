use core::fmt;

/// A free-text search scoped to one project, newest issues first.
///
/// The phrase is quoted verbatim: embedded `"` characters are not escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub project: String,
    pub open_only: bool,
}

const ORDER_BY: &str = "order by created desc";

impl SearchQuery {
    #[must_use]
    pub fn to_jql(&self) -> String {
        let Self {
            text,
            project,
            open_only,
        } = self;
        let mut jql = format!(
            "project={project} and (summary ~ \"{text}\" or description ~ \"{text}\")"
        );
        if *open_only {
            jql.push_str(" and status=Open");
        }
        jql.push(' ');
        jql.push_str(ORDER_BY);
        jql
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_jql())
    }
}

#[must_use]
pub fn build_search_query<S: AsRef<str>>(
    words: &[S],
    project: &str,
    open_only: bool,
) -> SearchQuery {
    let text = words
        .iter()
        .map(|word| word.as_ref())
        .collect::<Vec<&str>>()
        .join(" ");
    SearchQuery {
        text,
        project: project.to_owned(),
        open_only,
    }
}
