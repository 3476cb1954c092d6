use core::fmt::Write as _;

/// A rich reply: a titled block with a link, a body line and key/value
/// fields. Rendered as HTML with a plain-text fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Card {
    pub title: String,
    pub summary: Option<String>,
    pub link: Option<String>,
    pub body: Option<String>,
    pub fields: Vec<(String, String)>,
    pub color: Option<String>,
}

impl Card {
    #[must_use]
    pub fn to_plain(&self) -> String {
        let mut out = String::new();
        if let Some(summary) = &self.summary {
            let _ = writeln!(out, "{summary}");
        }
        out.push_str(&self.title);
        if let Some(link) = &self.link {
            let _ = write!(out, " <{link}>");
        }
        if let Some(body) = &self.body {
            let _ = write!(out, "\n{body}");
        }
        for (name, value) in &self.fields {
            let _ = write!(out, "\n{name}: {value}");
        }
        out
    }

    #[must_use]
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        if let Some(summary) = &self.summary {
            let _ = write!(out, "{}<br/>", escape_html(summary));
        }
        let title = escape_html(&self.title);
        let title = match &self.link {
            Some(link) => format!("<a href=\"{}\">{title}</a>", escape_html(link)),
            None => title,
        };
        match &self.color {
            Some(color) => {
                let _ = write!(
                    out,
                    "<strong><font data-mx-color=\"{0}\" color=\"{0}\">{title}</font></strong>",
                    escape_html(color)
                );
            }
            None => {
                let _ = write!(out, "<strong>{title}</strong>");
            }
        }
        if let Some(body) = &self.body {
            let _ = write!(out, "<br/>{}", escape_html(body));
        }
        if !self.fields.is_empty() {
            out.push_str("<ul>");
            for (name, value) in &self.fields {
                let _ = write!(
                    out,
                    "<li><b>{}</b>: {}</li>",
                    escape_html(name),
                    escape_html(value)
                );
            }
            out.push_str("</ul>");
        }
        out
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
