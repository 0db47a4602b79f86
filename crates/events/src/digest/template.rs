//! Handlebars rendering of digest emails.

use courier_core::digest::Digest;
use courier_core::types::Timestamp;
use handlebars::Handlebars;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
#[error("Template error: {0}")]
pub struct TemplateError(String);

/// Rendered email content.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDigest {
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Serialize)]
struct DigestContext<'a> {
    total: usize,
    date: String,
    groups: Vec<GroupContext<'a>>,
}

#[derive(Serialize)]
struct GroupContext<'a> {
    category: &'a str,
    total: usize,
    overflow: usize,
    items: Vec<ItemContext<'a>>,
}

#[derive(Serialize)]
struct ItemContext<'a> {
    title: &'a str,
    message: &'a str,
    priority: &'static str,
    time: String,
}

pub struct DigestTemplates {
    handlebars: Handlebars<'static>,
}

impl DigestTemplates {
    pub fn new() -> Result<Self, TemplateError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars
            .register_template_string("digest_text", DIGEST_TEXT_TEMPLATE)
            .map_err(|e| TemplateError(format!("Failed to register digest_text: {e}")))?;
        handlebars
            .register_template_string("digest_html", DIGEST_HTML_TEMPLATE)
            .map_err(|e| TemplateError(format!("Failed to register digest_html: {e}")))?;
        Ok(Self { handlebars })
    }

    pub fn render(&self, digest: &Digest, now: Timestamp) -> Result<RenderedDigest, TemplateError> {
        let context = DigestContext {
            total: digest.total,
            date: now.format("%Y-%m-%d").to_string(),
            groups: digest
                .groups
                .iter()
                .map(|g| GroupContext {
                    category: &g.category,
                    total: g.total,
                    overflow: g.overflow,
                    items: g
                        .items
                        .iter()
                        .map(|i| ItemContext {
                            title: &i.title,
                            message: &i.message,
                            priority: i.priority.as_str(),
                            time: i.created_at.format("%H:%M").to_string(),
                        })
                        .collect(),
                })
                .collect(),
        };

        let text = self
            .handlebars
            .render("digest_text", &context)
            .map_err(|e| TemplateError(e.to_string()))?;
        let html = self
            .handlebars
            .render("digest_html", &context)
            .map_err(|e| TemplateError(e.to_string()))?;

        let noun = if digest.total == 1 {
            "notification"
        } else {
            "notifications"
        };
        Ok(RenderedDigest {
            subject: format!("Your digest: {} unread {noun}", digest.total),
            text,
            html,
        })
    }
}

const DIGEST_TEXT_TEMPLATE: &str = r#"You have {{total}} unread notifications ({{date}}).
{{#each groups}}

{{{category}}} ({{total}})
{{#each items}}
- [{{priority}}] {{{title}}} ({{time}})
  {{{message}}}
{{/each}}
{{#if overflow}}
  ...and {{overflow}} more
{{/if}}
{{/each}}
"#;

const DIGEST_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif;">
  <h2>You have {{total}} unread notifications</h2>
  <p style="color: #666;">{{date}}</p>
  {{#each groups}}
  <h3>{{category}} ({{total}})</h3>
  <ul>
    {{#each items}}
    <li><strong>{{title}}</strong> <small>[{{priority}}] {{time}}</small><br>{{message}}</li>
    {{/each}}
  </ul>
  {{#if overflow}}<p>...and {{overflow}} more</p>{{/if}}
  {{/each}}
</body>
</html>
"#;
