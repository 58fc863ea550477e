use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use maud::{DOCTYPE, Markup, html};

use crate::config::SlugSection;
use crate::differ::{diff, render_ansi, render_html};
use crate::engine::SlugChangeRecord;
use crate::sites::Site;

const BOOTSTRAP_CSS: &str = "https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css";
const CSV_HEADER: [&str; 4] = ["uid", "hidden", "new_slug", "old_slug"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Html,
    #[default]
    Plain,
}

impl OutputFormat {
    /// Whether records need diff tokens attached for this format.
    pub fn needs_diff(self, color: bool) -> bool {
        match self {
            Self::Html => true,
            Self::Plain => color,
            Self::Csv => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Html => "html",
            Self::Plain => "plain",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "html" => Ok(Self::Html),
            "plain" | "text" => Ok(Self::Plain),
            other => Err(format!(
                "unknown output format `{other}` (expected csv, html or plain)"
            )),
        }
    }
}

/// What the report prints above the rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHeader {
    pub site_identifier: String,
    pub site_base: String,
    pub slug_format: String,
    pub replacements: BTreeMap<String, String>,
}

impl ReportHeader {
    pub fn new(site: &Site, slug: &SlugSection) -> Self {
        Self {
            site_identifier: site.identifier.clone(),
            site_base: site.base.raw.clone(),
            slug_format: slug.slug_format(),
            replacements: slug.effective_replacements(),
        }
    }
}

enum Sink<W: Write> {
    Csv(csv::Writer<W>),
    Text(W),
}

/// Renders change records as CSV, an HTML page, or indented plain text.
///
/// Unchanged pages are skipped unless `verbose` is set. HTML is assembled in
/// memory and written by [`ReportWriter::finish`].
pub struct ReportWriter<W: Write> {
    format: OutputFormat,
    verbose: bool,
    color: bool,
    sink: Sink<W>,
    header: Option<ReportHeader>,
    html_rows: Vec<Markup>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W, format: OutputFormat, verbose: bool, color: bool) -> Self {
        let sink = match format {
            OutputFormat::Csv => Sink::Csv(
                csv::WriterBuilder::new()
                    .delimiter(b';')
                    .has_headers(false)
                    .from_writer(out),
            ),
            OutputFormat::Html | OutputFormat::Plain => Sink::Text(out),
        };
        Self {
            format,
            verbose,
            color,
            sink,
            header: None,
            html_rows: Vec::new(),
        }
    }

    pub fn begin(&mut self, header: ReportHeader) -> Result<()> {
        match &mut self.sink {
            Sink::Csv(writer) => writer
                .write_record(CSV_HEADER)
                .context("failed to write CSV header")?,
            Sink::Text(out) if self.format == OutputFormat::Plain => {
                writeln!(out, "Site: {} ({})", header.site_identifier, header.site_base)?;
                writeln!(out, "Configuration:")?;
                writeln!(out, "- Slug Format: {}", header.slug_format)?;
                for (search, replace) in &header.replacements {
                    writeln!(out, "- Replace \"{search}\" with \"{replace}\"")?;
                }
                writeln!(out)?;
            }
            Sink::Text(_) => {}
        }
        self.header = Some(header);
        Ok(())
    }

    pub fn record(&mut self, record: &SlugChangeRecord) -> Result<()> {
        if !record.changed && !self.verbose {
            return Ok(());
        }
        match &mut self.sink {
            Sink::Csv(writer) => {
                let uid = record.uid.to_string();
                let new_slug = if record.changed {
                    record.new_slug.as_str()
                } else {
                    "UNCHANGED"
                };
                writer
                    .write_record([
                        uid.as_str(),
                        if record.hidden { "hidden" } else { "" },
                        new_slug,
                        record.old_slug.as_str(),
                    ])
                    .with_context(|| format!("failed to write CSV row for page {}", record.uid))?;
            }
            Sink::Text(_) if self.format == OutputFormat::Html => {
                self.html_rows.push(html_row(record));
            }
            Sink::Text(out) => write_plain(out, record, self.color)?,
        }
        Ok(())
    }

    /// Flush everything and hand back the underlying writer.
    pub fn finish(self) -> Result<W> {
        match self.sink {
            Sink::Csv(mut writer) => {
                writer.flush().context("failed to flush CSV output")?;
                writer
                    .into_inner()
                    .map_err(|err| anyhow!("failed to finish CSV output: {}", err.error()))
            }
            Sink::Text(mut out) => {
                if self.format == OutputFormat::Html {
                    let header = self
                        .header
                        .as_ref()
                        .context("HTML report finished before it was started")?;
                    let page = html_document(header, &self.html_rows);
                    writeln!(out, "{}", page.into_string())?;
                }
                out.flush().context("failed to flush report output")?;
                Ok(out)
            }
        }
    }
}

fn write_plain<W: Write>(out: &mut W, record: &SlugChangeRecord, color: bool) -> Result<()> {
    if let Some(redirect) = &record.redirect {
        writeln!(
            out,
            "Creating redirect from {} to {}",
            redirect.source_path, redirect.target
        )?;
    }
    writeln!(
        out,
        "{} {}{}",
        "*".repeat(record.depth + 1),
        record.uid,
        if record.hidden { " (HIDDEN)" } else { "" }
    )?;
    if record.changed {
        writeln!(out, "  OLD: {}", record.old_slug)?;
        writeln!(out, "  NEW: {}", record.new_slug)?;
        if color {
            let tokens = record
                .diff
                .clone()
                .unwrap_or_else(|| diff(Some(record.old_slug.as_str()), Some(record.new_slug.as_str())));
            writeln!(out, " DIFF: {}", render_ansi(&tokens))?;
        }
    } else {
        writeln!(out, " KEEP: {}", record.old_slug)?;
    }
    Ok(())
}

fn html_row(record: &SlugChangeRecord) -> Markup {
    let slug_class = if record.changed {
        "table-warning"
    } else {
        "table-success"
    };
    html! {
        tr class=[record.hidden.then_some("table-secondary")] {
            td { (record.uid) }
            td { (record.doktype.label()) }
            td { @if record.hidden { "hidden" } }
            td class=(slug_class) {
                @if record.changed {
                    @let tokens = record
                        .diff
                        .clone()
                        .unwrap_or_else(|| diff(Some(record.old_slug.as_str()), Some(record.new_slug.as_str())));
                    span title=(format!("{} -> {}", record.old_slug, record.new_slug)) {
                        (render_html(&tokens))
                    }
                } @else {
                    (record.new_slug)
                }
            }
            td {
                @if let Some(redirect) = &record.redirect {
                    a href=(redirect.source_url) { (redirect.source_path) }
                }
            }
        }
    }
}

fn html_document(header: &ReportHeader, rows: &[Markup]) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                link href=(BOOTSTRAP_CSS) rel="stylesheet";
            }
            body {
                h1 { "Site: " (header.site_identifier) " (" (header.site_base) ")" }
                h4 { "Configuration" }
                ul {
                    li { "Slug Format: " code { (header.slug_format) } }
                    @for (search, replace) in &header.replacements {
                        li { "Replace " code { (search) } " with " code { (replace) } }
                    }
                }
                table class="table" {
                    tr {
                        th { "UID" }
                        th { "Type" }
                        th { "Hidden?" }
                        th { "Slug" }
                        th { "Redirect" }
                    }
                    @for row in rows {
                        (row)
                    }
                }
            }
        }
    }
}
