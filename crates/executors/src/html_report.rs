// HTML report executor
//
// Renders the analysis sections in the job into a standalone HTML file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jobflow_engine::model::{JobContext, TaskResult};
use jobflow_engine::{ExecutionContext, Executor, ExecutorError, TaskInput};
use minijinja::{context, Environment, Value as TemplateValue};
use regex::Regex;
use serde_json::{json, Value};
use tracing::info;

const REPORT_TEMPLATE: &str = include_str!("../templates/report.html");

/// Section key, heading, and text shown while the section is missing
const SECTIONS: [(&str, &str, &str); 4] = [
    ("summary", "Summary", "Summary not available."),
    ("mindmap", "Mind Map", "Mind map not available."),
    ("key_points", "Key Points", "Key points not available."),
    ("insights", "Insights", "Insights not available."),
];

pub struct HtmlReportExecutor {
    output_dir: PathBuf,
}

impl HtmlReportExecutor {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn render(&self, video_id: &str, input: &TaskInput) -> Result<String, ExecutorError> {
        let bold = Regex::new(r"\*\*(.+?)\*\*").map_err(render_err)?;

        let sections: Vec<TemplateValue> = SECTIONS
            .iter()
            .map(|&(key, title, fallback)| {
                let markdown = input
                    .get(key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(fallback);
                context! {
                    title => title,
                    html => TemplateValue::from_safe_string(markdown_to_html(markdown, &bold)),
                }
            })
            .collect();

        let mut env = Environment::new();
        env.add_template("report.html", REPORT_TEMPLATE)
            .map_err(render_err)?;
        let template = env.get_template("report.html").map_err(render_err)?;

        template
            .render(context! {
                title => format!("YouTube Video Analysis - {video_id}"),
                video_id => video_id,
                video_url => format!("https://www.youtube.com/watch?v={video_id}"),
                generated_at => chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                sections => sections,
            })
            .map_err(render_err)
    }
}

#[async_trait]
impl Executor for HtmlReportExecutor {
    fn name(&self) -> &str {
        "html_report"
    }

    fn description(&self) -> &str {
        "Renders analysis results into an HTML report file"
    }

    async fn execute(
        &self,
        _ctx: &ExecutionContext,
        input: TaskInput,
        job_context: &JobContext,
    ) -> Result<TaskResult, ExecutorError> {
        let video_id = job_context
            .get("video_id")
            .map(String::as_str)
            .filter(|id| !id.is_empty())
            .unwrap_or("unknown");

        let html = self.render(video_id, &input)?;

        let filename = format!(
            "youtube_analysis_{}_{}.html",
            file_safe(video_id),
            chrono::Utc::now().timestamp()
        );
        let path = self.output_dir.join(&filename);

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| io_err("create report directory", e))?;
        tokio::fs::write(&path, &html)
            .await
            .map_err(|e| io_err("write report", e))?;

        info!(path = %path.display(), size = html.len(), "HTML report generated");

        let mut result = TaskResult::new();
        result.insert("report_path".into(), json!(path.to_string_lossy()));
        result.insert("report_url".into(), json!(format!("/reports/{filename}")));
        result.insert("filename".into(), json!(filename));
        result.insert("size".into(), json!(html.len()));
        Ok(result)
    }
}

fn render_err(e: impl std::fmt::Display) -> ExecutorError {
    ExecutorError::new(format!("failed to render report: {e}")).with_type("RENDER_ERROR")
}

fn io_err(action: &str, e: std::io::Error) -> ExecutorError {
    ExecutorError::new(format!("failed to {action}: {e}")).with_type("IO_ERROR")
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum List {
    Unordered,
    Ordered,
}

impl List {
    fn tag(self) -> &'static str {
        match self {
            List::Unordered => "ul",
            List::Ordered => "ol",
        }
    }
}

/// Minimal Markdown rendering: headings, bullet and numbered lists,
/// paragraphs and `**bold**`. All text is escaped first.
fn markdown_to_html(markdown: &str, bold: &Regex) -> String {
    let inline = |text: &str| {
        bold.replace_all(&escape_html(text), "<strong>$1</strong>")
            .into_owned()
    };

    let mut html = String::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut list: Option<List> = None;

    let flush_paragraph = |html: &mut String, paragraph: &mut Vec<String>| {
        if !paragraph.is_empty() {
            html.push_str(&format!("<p>{}</p>\n", paragraph.join(" ")));
            paragraph.clear();
        }
    };
    let close_list = |html: &mut String, list: &mut Option<List>| {
        if let Some(kind) = list.take() {
            html.push_str(&format!("</{}>\n", kind.tag()));
        }
    };

    for line in markdown.lines().map(str::trim) {
        if line.is_empty() {
            flush_paragraph(&mut html, &mut paragraph);
            close_list(&mut html, &mut list);
            continue;
        }

        if line.starts_with('#') {
            let level = line.chars().take_while(|c| *c == '#').count().min(3);
            let text = line.trim_start_matches('#').trim();
            flush_paragraph(&mut html, &mut paragraph);
            close_list(&mut html, &mut list);
            html.push_str(&format!("<h{level}>{}</h{level}>\n", inline(text)));
            continue;
        }

        let item = if let Some(text) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            Some((List::Unordered, text))
        } else {
            ordered_item(line).map(|text| (List::Ordered, text))
        };

        match item {
            Some((kind, text)) => {
                flush_paragraph(&mut html, &mut paragraph);
                if list != Some(kind) {
                    close_list(&mut html, &mut list);
                    html.push_str(&format!("<{}>\n", kind.tag()));
                    list = Some(kind);
                }
                html.push_str(&format!("<li>{}</li>\n", inline(text)));
            }
            None => {
                close_list(&mut html, &mut list);
                paragraph.push(inline(line));
            }
        }
    }

    flush_paragraph(&mut html, &mut paragraph);
    close_list(&mut html, &mut list);
    html
}

/// Text of a `1. item` line
fn ordered_item(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix(". ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::execution_context;

    fn bold() -> Regex {
        Regex::new(r"\*\*(.+?)\*\*").unwrap()
    }

    #[test]
    fn test_markdown_blocks() {
        let html = markdown_to_html(
            "# Title\n\nIntro line\ncontinues here\n\n- one\n- **two**\n\n1. first\n2. second\n### Deep",
            &bold(),
        );
        assert_eq!(
            html,
            "<h1>Title</h1>\n\
             <p>Intro line continues here</p>\n\
             <ul>\n<li>one</li>\n<li><strong>two</strong></li>\n</ul>\n\
             <ol>\n<li>first</li>\n<li>second</li>\n</ol>\n\
             <h3>Deep</h3>\n"
        );
    }

    #[test]
    fn test_markdown_escapes_html() {
        let html = markdown_to_html("<script>alert('x')</script>", &bold());
        assert_eq!(
            html,
            "<p>&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;</p>\n"
        );
    }

    #[test]
    fn test_file_safe() {
        assert_eq!(file_safe("dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(file_safe("../etc/passwd"), "___etc_passwd");
    }

    #[tokio::test]
    async fn test_report_written_to_output_dir() {
        let dir = std::env::temp_dir().join(format!("jobflow-reports-{}", uuid::Uuid::now_v7()));
        let executor = HtmlReportExecutor::new(&dir);

        let mut job_context = JobContext::new();
        job_context.insert("video_id".into(), "dQw4w9WgXcQ".into());
        let mut input = TaskInput::new();
        input.insert("summary".into(), json!("# Summary\n\nA **short** talk."));

        let result = executor
            .execute(&execution_context("html_report"), input, &job_context)
            .await
            .unwrap();

        let filename = result["filename"].as_str().unwrap();
        assert!(filename.starts_with("youtube_analysis_dQw4w9WgXcQ_"));
        assert_eq!(result["report_url"], json!(format!("/reports/{filename}")));

        let html = std::fs::read_to_string(dir.join(filename)).unwrap();
        assert_eq!(result["size"], json!(html.len()));
        assert!(html.contains("<strong>short</strong>"));
        assert!(html.contains("Mind map not available."));
        assert!(html.contains("watch?v=dQw4w9WgXcQ"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_unknown_video_id_default() {
        let dir = std::env::temp_dir().join(format!("jobflow-reports-{}", uuid::Uuid::now_v7()));
        let result = HtmlReportExecutor::new(&dir)
            .execute(
                &execution_context("html_report"),
                TaskInput::new(),
                &JobContext::new(),
            )
            .await
            .unwrap();

        assert!(result["filename"]
            .as_str()
            .unwrap()
            .starts_with("youtube_analysis_unknown_"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
