use crate::error::TemplateError;
use crate::markup::escape_html;

pub const WRAPPER_TEMPLATE: &str = "wrapper.html";

/// Values handed to a page template.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub title: String,
    /// Rendered `<form>` markup.
    pub form: String,
    /// Client behavior snippets keyed by identifier, in a stable order.
    pub scripts: Vec<(String, String)>,
    /// Diagnostic text shown above the form.
    pub errors: Option<String>,
}

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, context: &PageContext) -> Result<String, TemplateError>;
}

/// The page shipped with the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTemplates;

impl TemplateRenderer for BuiltinTemplates {
    fn render(&self, name: &str, context: &PageContext) -> Result<String, TemplateError> {
        match name {
            WRAPPER_TEMPLATE => Ok(render_wrapper(context)),
            other => Err(TemplateError::Unknown(other.to_string())),
        }
    }
}

fn render_wrapper(context: &PageContext) -> String {
    let scripts: String = context
        .scripts
        .iter()
        .map(|(identifier, snippet)| format!("// {identifier}{snippet}\n"))
        .collect();
    let errors = context
        .errors
        .as_deref()
        .map(|errors| format!("<pre class=\"errors\">{}</pre>\n", escape_html(errors)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
body {{ font-family: system-ui, sans-serif; max-width: 960px; margin: 40px auto; padding: 0 20px; }}
fieldset.group {{ display: grid; grid-template-columns: max-content 1fr 1fr; gap: 6px 12px; align-items: start; margin-bottom: 16px; }}
table.group {{ margin-bottom: 16px; }}
legend, caption {{ font-weight: 600; text-align: left; }}
.help {{ color: #555; font-size: 0.9em; }}
.description, .epilog {{ color: #333; }}
.input-ul {{ list-style: none; margin: 0; padding: 0; }}
.input-ul li {{ margin-bottom: 4px; }}
input.add {{ background: lightgreen; }}
input.remove {{ background: pink; }}
.buttons input {{ margin-right: 8px; padding: 6px 16px; }}
pre.errors, pre.diagnostic {{ color: #a00; white-space: pre-wrap; }}
</style>
<script>
{scripts}</script>
</head>
<body>
<h1>{title}</h1>
{errors}{form}
</body>
</html>"#,
        title = escape_html(&context.title),
        scripts = scripts,
        errors = errors,
        form = context.form,
    )
}
