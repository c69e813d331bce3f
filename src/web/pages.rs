//! Server-rendered HTML for the upload form and the result page

use crate::image_processing::OperationDescriptor;

const PARAMS_SCRIPT: &str = include_str!("../../static/js/main.js");

const STYLESHEET: &str =
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css";

/// Escape text for use in HTML element content and quoted attributes
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// JSON safe to place inside a `<script>` element
fn script_json(operations: &[OperationDescriptor]) -> String {
    serde_json::to_string(operations)
        .unwrap_or_else(|_| "[]".to_string())
        .replace("</", "<\\/")
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title}</title>
  <link rel="stylesheet" href="{STYLESHEET}">
</head>
<body class="bg-light">
<main class="container py-4">
{body}
</main>
</body>
</html>
"#,
        title = escape_html(title),
    )
}

fn flash_list(messages: &[String]) -> String {
    messages
        .iter()
        .map(|m| format!("  <div class=\"alert alert-warning\" role=\"alert\">{}</div>\n", escape_html(m)))
        .collect()
}

/// Upload form with the operation picker
pub fn index(operations: &[OperationDescriptor], messages: &[String]) -> String {
    let options: String = operations
        .iter()
        .map(|op| {
            format!(
                "        <option value=\"{}\">{}</option>\n",
                escape_html(op.name),
                escape_html(op.label)
            )
        })
        .collect();

    let body = format!(
        r#"  <h1 class="mb-4">Image Operations</h1>
{flashes}  <form action="/process" method="post" enctype="multipart/form-data" class="card card-body">
    <div class="mb-3">
      <label class="form-label" for="image">Image</label>
      <input class="form-control" type="file" id="image" name="image" accept=".png,.jpg,.jpeg,.webp,.bmp">
    </div>
    <div class="mb-3">
      <label class="form-label" for="operation">Operation</label>
      <select class="form-select" id="operation" name="operation">
{options}      </select>
    </div>
    <div class="row g-3 mb-3" id="params"></div>
    <button class="btn btn-primary" type="submit">Process</button>
  </form>
  <script type="application/json" id="ops-data">{ops_json}</script>
  <script>
{script}
  </script>"#,
        flashes = flash_list(messages),
        options = options,
        ops_json = script_json(operations),
        script = PARAMS_SCRIPT,
    );
    layout("Image Operations", &body)
}

/// Result page embedding the processed image and a download link
pub fn result(result_id: &str, image_url: &str) -> String {
    let body = format!(
        r#"  <h1 class="mb-4">Result</h1>
  <div class="card card-body">
    <img class="img-fluid mb-3" src="{image_url}" alt="Processed image">
    <div>
      <a class="btn btn-success" href="/download/{id}">Download</a>
      <a class="btn btn-link" href="/">Process another image</a>
    </div>
  </div>"#,
        image_url = escape_html(image_url),
        id = escape_html(result_id),
    );
    layout("Result", &body)
}
