//! The HTML index page

use axum::extract::State;
use axum::response::Html;
use std::fmt::Write;
use tracing::debug;

use crate::core::models::VideoRecord;
use crate::utils::file_utils::{format_duration, humanize_bytes};
use crate::AppState;

pub const INDEX_TEMPLATE: &str = "index.html";

const BUILTIN_TEMPLATE: &str = include_str!("../../templates/index.html");

pub async fn index(State(state): State<AppState>) -> Html<String> {
    let path = state.config.paths.templates_dir.join(INDEX_TEMPLATE);
    let template = match tokio::fs::read_to_string(&path).await {
        Ok(template) => template,
        Err(e) => {
            debug!("Using built-in page template ({:?}: {})", path, e);
            BUILTIN_TEMPLATE.to_string()
        }
    };

    Html(render_index(&template, &state.catalog().list()))
}

/// Fill `{{ video_count }}` and `{{ videos }}` in `template`
pub fn render_index(template: &str, videos: &[VideoRecord]) -> String {
    let mut items = String::new();
    if videos.is_empty() {
        items.push_str("<li class=\"empty\">No videos downloaded yet.</li>\n");
    }
    for video in videos {
        let _ = write!(
            items,
            concat!(
                "<li class=\"video\">\n",
                "  <h3>{}</h3>\n",
                "  <p class=\"meta\">{} &middot; {} &middot; {}</p>\n",
                "  <p class=\"description\">{}</p>\n",
                "  <code class=\"path\">{}</code>\n",
                "</li>\n"
            ),
            escape_html(&video.title),
            escape_html(&video.author),
            format_duration(video.duration_seconds),
            humanize_bytes(video.file_size_bytes),
            escape_html(&video.description_excerpt),
            escape_html(&video.file_path.to_string_lossy()),
        );
    }

    template
        .replace("{{ video_count }}", &videos.len().to_string())
        .replace("{{ videos }}", &items)
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    #[test]
    fn test_render_escapes_and_counts() {
        let video = VideoRecord {
            title: "<script>alert(1)</script>".to_string(),
            duration_seconds: 3725,
            author: "Tom & Jerry".to_string(),
            description_excerpt: "desc".to_string(),
            file_size_bytes: 1_500_000,
            file_path: PathBuf::from("downloads/x.mp4"),
            completed_at: Utc::now(),
        };

        let html = render_index("<p>{{ video_count }}</p><ul>{{ videos }}</ul>", &[video]);
        assert!(html.starts_with("<p>1</p>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Tom &amp; Jerry"));
        assert!(html.contains("1:02:05"));
        assert!(html.contains("1.5 MB"));
    }

    #[test]
    fn test_render_empty() {
        let html = render_index(BUILTIN_TEMPLATE, &[]);
        assert!(html.contains("No videos downloaded yet."));
        assert!(!html.contains("{{ videos }}"));
        assert!(!html.contains("{{ video_count }}"));
    }
}
