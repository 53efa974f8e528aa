//! In-process text extraction to markdown.
//!
//! | Extension | Handling |
//! |-----------|----------|
//! | `md`, `txt` | UTF-8 (lossy) passthrough |
//! | `csv` | rendered as a markdown table |
//! | `pdf` | `pdf-extract`, blank-line paragraphs kept |
//! | `docx` | `word/document.xml`, one paragraph per `<w:p>` |
//! | `xlsx` | one `## Sheet N` table per worksheet, shared strings resolved |
//!
//! OOXML entries are read through a size cap to guard against zip bombs.

use std::io::Read;

use quick_xml::events::Event;

/// Maximum decompressed bytes read from one ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_ROWS_PER_SHEET: usize = 100_000;

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

/// Extract markdown from `bytes` according to `extension` (lowercase).
pub fn extract_markdown(bytes: &[u8], extension: &str) -> Result<String, String> {
    match extension {
        "md" | "markdown" | "txt" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        "csv" => Ok(csv_to_markdown(&String::from_utf8_lossy(bytes))),
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        "xlsx" => extract_xlsx(bytes),
        other => Err(format!("no local extractor for '.{}' files", other)),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, String> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| format!("PDF extraction failed: {}", e))?;
    Ok(collapse_blank_lines(&text))
}

/// Trim trailing spaces and squeeze runs of blank lines to one.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        blank_run = 0;
    }
    out
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, String> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| format!("not an OOXML file: {}", e))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Option<Vec<u8>>, String> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(format!("ZIP entry {} exceeds size limit", name));
    }
    Ok(Some(out))
}

fn extract_docx(bytes: &[u8]) -> Result<String, String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?
        .ok_or_else(|| "word/document.xml not found".to_string())?;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                current.push_str(&te.unescape().unwrap_or_default());
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = current.trim();
                    if !para.is_empty() {
                        paragraphs.push(para.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("DOCX XML error: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        paragraphs.push(current.trim().to_string());
    }
    Ok(paragraphs.join("\n\n"))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, String> {
    let mut archive = open_archive(bytes)?;
    let shared = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let mut sheet_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    sheet_names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut sections = Vec::new();
    for (idx, name) in sheet_names.iter().take(XLSX_MAX_SHEETS).enumerate() {
        let Some(xml) = read_entry(&mut archive, name)? else {
            continue;
        };
        let rows = parse_sheet_rows(&xml, &shared)?;
        if rows.is_empty() {
            continue;
        }
        sections.push(format!("## Sheet {}\n\n{}", idx + 1, markdown_table(&rows)));
    }
    Ok(sections.join("\n\n"))
}

fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, String> {
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => current.push_str(&te.unescape().unwrap_or_default()),
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("sharedStrings XML error: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cell values per row, in document order. Shared-string (`t="s"`) cells
/// are resolved; numbers and inline strings are kept verbatim.
fn parse_sheet_rows(xml: &[u8], shared: &[String]) -> Result<Vec<Vec<String>>, String> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell_type: Option<Vec<u8>> = None;
    let mut value = String::new();
    let mut in_value = false;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        if rows.len() >= XLSX_MAX_ROWS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    cell_type = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"t")
                        .map(|a| a.value.into_owned());
                    value.clear();
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => value.push_str(&te.unescape().unwrap_or_default()),
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    let resolved = match cell_type.as_deref() {
                        Some(b"s") => value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared.get(i).cloned())
                            .unwrap_or_default(),
                        _ => value.trim().to_string(),
                    };
                    row.push(resolved);
                }
                b"row" => {
                    if row.iter().any(|c| !c.is_empty()) {
                        rows.push(std::mem::take(&mut row));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("worksheet XML error: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

/// Render rows as a markdown table; the first row is the header.
fn markdown_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let render = |row: &[String]| {
        let cells: Vec<String> = (0..width)
            .map(|i| {
                row.get(i)
                    .map(|c| c.replace('|', "\\|").replace('\n', " "))
                    .unwrap_or_default()
            })
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(render(&rows[0]));
    lines.push(format!("|{}", " --- |".repeat(width)));
    lines.extend(rows[1..].iter().map(|r| render(r)));
    lines.join("\n")
}

fn csv_to_markdown(text: &str) -> String {
    let rows: Vec<Vec<String>> = parse_csv(text)
        .into_iter()
        .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
        .collect();
    if rows.is_empty() {
        return String::new();
    }
    markdown_table(&rows)
}

/// RFC 4180 CSV: quoted fields, doubled quotes, embedded newlines.
fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
