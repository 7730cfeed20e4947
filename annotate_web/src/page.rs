pub const PANEL_SCRIPT: &str = "/static/pkg/upload_panel.js";
pub const PANEL_STYLESHEET: &str = "/static/css/panel.css";

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn class_badges(class_names: &[String]) -> String {
    class_names
        .iter()
        .map(|name| {
            let name = escape_html(name);
            format!(r#"<span class="class-badge" data-class="{name}">{name}</span>"#)
        })
        .collect::<Vec<_>>()
        .join("\n        ")
}

/// The upload page with one filter badge per known class.
pub fn index_page(class_names: &[String]) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Object detection</title>
    <link rel="stylesheet" href="{stylesheet}">
</head>
<body>
    <h1>Object detection</h1>

    <div id="dropZone" class="drop-zone">
        <p>Drop an image here or click to choose one</p>
        <input type="file" id="fileInput" accept="image/*" hidden>
    </div>

    <div class="loading">Processing...</div>

    <section class="classes">
        {badges}
    </section>

    <section class="results">
        <div class="image-container">
            <img id="originalImage" alt="Original image">
        </div>
        <div class="image-container">
            <img id="markedImage" alt="Annotated image">
        </div>
        <div id="predictions" class="predictions"></div>
    </section>

    <section class="charts">
        <img id="graphsImage" alt="Detection statistics">
    </section>

    <script type="module">
        import init from "{script}";
        init();
    </script>
</body>
</html>
"#,
        stylesheet = PANEL_STYLESHEET,
        badges = class_badges(class_names),
        script = PANEL_SCRIPT,
    )
}
