//! Week content ingestion from spreadsheet files (Excel and CSV)

use calamine::{open_workbook, Data, Reader, Xlsx};
use csv::ReaderBuilder;
use rusqlite::Connection;
use std::path::Path;

use crate::db::{add_affix, add_vocab};
use crate::error::{CoreError, CoreResult};

/// Column index mapping for vocabulary files
#[derive(Debug, Default, Clone)]
struct VocabColumns {
    word: usize,
    definition: usize,
    example: Option<usize>,
}

/// Column index mapping for affix files
#[derive(Debug, Default, Clone)]
struct AffixColumns {
    affix: usize,
    meaning: usize,
    kind: Option<usize>,
}

/// Detect vocabulary column indices from header names
fn detect_vocab_columns(headers: &[String]) -> CoreResult<VocabColumns> {
    let mut mapping = VocabColumns::default();
    let mut word_found = false;
    let mut definition_found = false;

    for (i, header) in headers.iter().enumerate() {
        match header.to_lowercase().trim() {
            "word" | "words" | "vocabulary" => {
                mapping.word = i;
                word_found = true;
            }
            "definition" | "definitions" | "meaning" | "meanings" => {
                mapping.definition = i;
                definition_found = true;
            }
            "example" | "example sentence" | "sentence" => mapping.example = Some(i),
            _ => {} // Unknown columns ignored
        }
    }

    if !word_found {
        return Err(CoreError::Import(
            "missing required 'Word' column in file header".to_string(),
        ));
    }
    if !definition_found {
        return Err(CoreError::Import(
            "missing required 'Definition' column in file header".to_string(),
        ));
    }
    Ok(mapping)
}

/// Detect affix column indices from header names
fn detect_affix_columns(headers: &[String]) -> CoreResult<AffixColumns> {
    let mut mapping = AffixColumns::default();
    let mut affix_found = false;
    let mut meaning_found = false;

    for (i, header) in headers.iter().enumerate() {
        match header.to_lowercase().trim() {
            "affix" | "affixes" => {
                mapping.affix = i;
                affix_found = true;
            }
            "meaning" | "meanings" | "definition" => {
                mapping.meaning = i;
                meaning_found = true;
            }
            "kind" | "type" => mapping.kind = Some(i),
            _ => {}
        }
    }

    if !affix_found {
        return Err(CoreError::Import(
            "missing required 'Affix' column in file header".to_string(),
        ));
    }
    if !meaning_found {
        return Err(CoreError::Import(
            "missing required 'Meaning' column in file header".to_string(),
        ));
    }
    Ok(mapping)
}

/// Read all rows of the first sheet of an Excel workbook as strings.
fn rows_from_xlsx(file_path: &str) -> CoreResult<Vec<Vec<String>>> {
    let mut workbook: Xlsx<_> = open_workbook(file_path)
        .map_err(|e| CoreError::Import(format!("failed to open Excel file: {e}")))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .ok_or_else(|| CoreError::Import("no sheets found in Excel file".to_string()))?
        .clone();

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| CoreError::Import(format!("failed to read sheet: {e}")))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_string).collect())
        .collect())
}

/// Read all records of a CSV file as strings, header row included.
fn rows_from_csv(file_path: &str) -> CoreResult<Vec<Vec<String>>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(file_path)
        .map_err(|e| CoreError::Import(format!("failed to open CSV file: {e}")))?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| CoreError::Import(format!("failed to read CSV row: {e}")))?;
        rows.push(record.iter().map(|s| s.trim().to_string()).collect());
    }
    Ok(rows)
}

/// Read a spreadsheet as string rows, dispatching on file extension.
fn rows_from_file(file_path: &str) -> CoreResult<Vec<Vec<String>>> {
    let extension = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "xlsx" | "xls" => rows_from_xlsx(file_path),
        "csv" => rows_from_csv(file_path),
        _ => Err(CoreError::Import(format!(
            "unsupported file format: .{extension}"
        ))),
    }
}

fn cell_at(row: &[String], index: usize) -> String {
    row.get(index).cloned().unwrap_or_default()
}

/// Load a week's vocabulary list from a spreadsheet. Returns the number
/// of words inserted; rows with an empty word or definition are skipped.
pub fn import_week_vocab(conn: &Connection, week_id: i64, file_path: &str) -> CoreResult<usize> {
    let mut rows = rows_from_file(file_path)?.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| CoreError::Import("empty file - no header row".to_string()))?;
    let mapping = detect_vocab_columns(&header)?;

    let mut count = 0;
    for row in rows {
        let word = cell_at(&row, mapping.word);
        let definition = cell_at(&row, mapping.definition);
        let example = mapping
            .example
            .map(|i| cell_at(&row, i))
            .unwrap_or_default();

        if word.is_empty() || definition.is_empty() {
            continue;
        }
        add_vocab(conn, week_id, &word, &definition, &example)?;
        count += 1;
    }

    log::debug!("imported {count} vocabulary words into week {week_id}");
    Ok(count)
}

/// Load a week's affix list from a spreadsheet. Returns the number of
/// affixes inserted; rows with an empty affix or meaning are skipped.
pub fn import_week_affixes(conn: &Connection, week_id: i64, file_path: &str) -> CoreResult<usize> {
    let mut rows = rows_from_file(file_path)?.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| CoreError::Import("empty file - no header row".to_string()))?;
    let mapping = detect_affix_columns(&header)?;

    let mut count = 0;
    for row in rows {
        let affix = cell_at(&row, mapping.affix);
        let meaning = cell_at(&row, mapping.meaning);
        let kind = mapping
            .kind
            .map(|i| cell_at(&row, i).to_lowercase())
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| "prefix".to_string());

        if affix.is_empty() || meaning.is_empty() {
            continue;
        }
        add_affix(conn, week_id, &affix, &kind, &meaning)?;
        count += 1;
    }

    log::debug!("imported {count} affixes into week {week_id}");
    Ok(count)
}

/// Helper to extract string from Excel cell
fn cell_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
        Data::Empty => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{affixes_for_week, create_week, memory_conn, vocab_for_week};
    use std::io::Write;

    fn csv_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".csv")
            .tempfile()
            .expect("create temp csv");
        file.write_all(contents.as_bytes()).expect("write temp csv");
        file
    }

    #[test]
    fn vocab_csv_imports_with_header_mapping() {
        let conn = memory_conn();
        let week = create_week(&conn, "t1", "Week 1").unwrap();

        let file = csv_file(
            "Word,Definition,Example\n\
             benevolent,kind and generous,The benevolent king fed the poor.\n\
             commerce,the buying and selling of goods,\n\
             ,missing word is skipped,\n",
        );
        let count = import_week_vocab(&conn, week, file.path().to_str().unwrap()).unwrap();
        assert_eq!(count, 2);

        let vocab = vocab_for_week(&conn, week).unwrap();
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab[0].word, "benevolent");
        assert_eq!(vocab[0].example_sentence, "The benevolent king fed the poor.");
        assert_eq!(vocab[1].example_sentence, "");
    }

    #[test]
    fn vocab_csv_accepts_meaning_header_and_reordered_columns() {
        let conn = memory_conn();
        let week = create_week(&conn, "t1", "Week 1").unwrap();

        let file = csv_file("Meaning,Word\nkind and generous,benevolent\n");
        let count = import_week_vocab(&conn, week, file.path().to_str().unwrap()).unwrap();
        assert_eq!(count, 1);

        let vocab = vocab_for_week(&conn, week).unwrap();
        assert_eq!(vocab[0].word, "benevolent");
        assert_eq!(vocab[0].definition, "kind and generous");
    }

    #[test]
    fn vocab_csv_without_required_columns_fails() {
        let conn = memory_conn();
        let week = create_week(&conn, "t1", "Week 1").unwrap();

        let file = csv_file("Word,Synonyms\nbenevolent,kindly\n");
        let err = import_week_vocab(&conn, week, file.path().to_str().unwrap());
        assert!(matches!(err, Err(CoreError::Import(_))));
        assert!(vocab_for_week(&conn, week).unwrap().is_empty());
    }

    #[test]
    fn affix_csv_imports_with_default_kind() {
        let conn = memory_conn();
        let week = create_week(&conn, "t1", "Week 1").unwrap();

        let file = csv_file(
            "Affix,Kind,Meaning\n\
             inter-,prefix,between\n\
             -ment,suffix,action or result\n\
             bene,,good or well\n",
        );
        let count = import_week_affixes(&conn, week, file.path().to_str().unwrap()).unwrap();
        assert_eq!(count, 3);

        let affixes = affixes_for_week(&conn, week).unwrap();
        assert_eq!(affixes[0].kind, "prefix");
        assert_eq!(affixes[1].kind, "suffix");
        // Empty kind cell falls back to prefix
        assert_eq!(affixes[2].kind, "prefix");
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let conn = memory_conn();
        let week = create_week(&conn, "t1", "Week 1").unwrap();
        let err = import_week_vocab(&conn, week, "/tmp/words.txt");
        assert!(matches!(err, Err(CoreError::Import(_))));
    }
}
