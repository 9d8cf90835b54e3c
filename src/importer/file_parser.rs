// ==========================================
// 案件管理系统数据迁移 - 文件解析器实现
// ==========================================
// 阶段 0: 原始字节 → ParsedFile
// 支持: CSV (.csv) / Excel (.xlsx/.xls)
// 约束:
// - 纯转换，无副作用
// - 表头 = 第一个非空行；表头重复为文件级错误
// - 单行错误不中断解析（分类后继续）
// ==========================================

use crate::domain::record::{ParseError, ParseErrorKind, ParsedFile, RawRow, RawValues};
use crate::domain::types::EntityType;
use crate::importer::error::{MigrationError, MigrationResult};
use calamine::{open_workbook_auto_from_rs, Reader};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// 解析结果: 成功得到 ParsedFile（可能含行级错误），或文件级错误列表
pub type ParseOutcome = Result<ParsedFile, Vec<ParseError>>;

// ==========================================
// FileParser Trait
// ==========================================
// 实现者: CsvParser, ExcelParser
pub trait FileParser: Send + Sync {
    fn parse_bytes(&self, entity_type: EntityType, bytes: &[u8]) -> ParseOutcome;
}

// ==========================================
// 行分类器（CSV/Excel 共用）
// ==========================================
struct RowClassifier {
    entity_type: EntityType,
    header: Option<Vec<String>>,
    rows: Vec<RawRow>,
    row_count: usize,
    row_errors: Vec<ParseError>,
}

impl RowClassifier {
    fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            header: None,
            rows: Vec::new(),
            row_count: 0,
            row_errors: Vec::new(),
        }
    }

    fn is_blank(cells: &[String]) -> bool {
        cells.iter().all(|c| c.trim().is_empty())
    }

    /// 行值 → 列名映射（超出表头的单元格以 column_N 命名）
    fn raw_values(&self, cells: &[String]) -> RawValues {
        let header = self.header.as_deref().unwrap_or(&[]);
        cells
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let key = header
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("column_{}", i + 1));
                (key, value.clone())
            })
            .collect()
    }

    /// 接收表头；重复列名返回文件级错误
    fn accept_header(&mut self, cells: Vec<String>) -> Result<(), Vec<ParseError>> {
        let header: Vec<String> = cells.iter().map(|c| c.trim().to_string()).collect();

        let mut seen = HashSet::new();
        let duplicates: Vec<ParseError> = header
            .iter()
            .filter(|h| !h.is_empty())
            .filter(|h| !seen.insert(h.to_lowercase()))
            .map(|h| {
                ParseError::file_level(
                    self.entity_type,
                    ParseErrorKind::DuplicateHeader,
                    format!("表头列名重复: {}", h),
                )
            })
            .collect();

        if !duplicates.is_empty() {
            return Err(duplicates);
        }
        self.header = Some(header);
        Ok(())
    }

    /// 接收一行（表头尚未出现时作为表头）
    fn accept_cells(
        &mut self,
        source_row_index: usize,
        cells: Vec<String>,
    ) -> Result<(), Vec<ParseError>> {
        if Self::is_blank(&cells) {
            return Ok(());
        }
        let expected = match self.header.as_ref().map(Vec::len) {
            None => return self.accept_header(cells),
            Some(n) => n,
        };

        self.row_count += 1;
        if cells.len() != expected {
            let message = format!("列数不一致: 表头 {} 列，本行 {} 列", expected, cells.len());
            self.reject_row(
                source_row_index,
                ParseErrorKind::ColumnCountMismatch,
                message,
                &cells,
            );
            return Ok(());
        }

        self.rows.push(RawRow {
            source_row_index,
            cells: cells.into_iter().map(|c| c.trim().to_string()).collect(),
        });
        Ok(())
    }

    fn reject_row(
        &mut self,
        source_row_index: usize,
        kind: ParseErrorKind,
        message: String,
        cells: &[String],
    ) {
        warn!(
            entity_type = %self.entity_type,
            row = source_row_index,
            kind = ?kind,
            "行解析失败: {}",
            message
        );
        self.row_errors.push(ParseError {
            entity_type: self.entity_type,
            source_row_index: Some(source_row_index),
            kind,
            message,
            raw_values: self.raw_values(cells),
        });
    }

    /// 编码错误行（表头阶段即为文件级错误）
    fn accept_encoding_error(
        &mut self,
        source_row_index: usize,
        lossy: Vec<String>,
    ) -> Result<(), Vec<ParseError>> {
        if self.header.is_none() {
            return Err(vec![ParseError::file_level(
                self.entity_type,
                ParseErrorKind::Encoding,
                "表头不是有效的 UTF-8 文本".to_string(),
            )]);
        }
        if Self::is_blank(&lossy) {
            return Ok(());
        }
        self.row_count += 1;
        self.reject_row(
            source_row_index,
            ParseErrorKind::Encoding,
            "单元格不是有效的 UTF-8 文本".to_string(),
            &lossy,
        );
        Ok(())
    }

    fn finish(self) -> ParseOutcome {
        let header_row = match self.header {
            Some(h) => h,
            None => {
                return Err(vec![ParseError::file_level(
                    self.entity_type,
                    ParseErrorKind::EmptyFile,
                    "文件为空或没有表头".to_string(),
                )])
            }
        };

        debug!(
            entity_type = %self.entity_type,
            rows = self.rows.len(),
            row_errors = self.row_errors.len(),
            "文件解析完成"
        );

        Ok(ParsedFile {
            entity_type: self.entity_type,
            header_row,
            rows: self.rows,
            row_count: self.row_count,
            row_errors: self.row_errors,
        })
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_bytes(&self, entity_type: EntityType, bytes: &[u8]) -> ParseOutcome {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        let mut reader = ReaderBuilder::new()
            .has_headers(false) // 表头自行探测（第一个非空行）
            .flexible(true) // 列数由分类器判定
            .from_reader(bytes);

        let mut classifier = RowClassifier::new(entity_type);
        for (ordinal, result) in reader.byte_records().enumerate() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    let row = e
                        .position()
                        .map(|p| p.line() as usize)
                        .unwrap_or(ordinal + 1);
                    let is_io = e.is_io_error();
                    if classifier.header.is_none() {
                        return Err(vec![ParseError::file_level(
                            entity_type,
                            ParseErrorKind::MalformedRow,
                            format!("表头解析失败: {}", e),
                        )]);
                    }
                    classifier.row_count += 1;
                    classifier.reject_row(row, ParseErrorKind::MalformedRow, e.to_string(), &[]);
                    if is_io {
                        break;
                    }
                    continue;
                }
            };

            let row = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(ordinal + 1);

            let decoded: Result<Vec<String>, _> = record
                .iter()
                .map(|field| std::str::from_utf8(field).map(str::to_string))
                .collect();

            match decoded {
                Ok(cells) => classifier.accept_cells(row, cells)?,
                Err(_) => {
                    let lossy = record
                        .iter()
                        .map(|field| String::from_utf8_lossy(field).into_owned())
                        .collect();
                    classifier.accept_encoding_error(row, lossy)?;
                }
            }
        }

        classifier.finish()
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
// 读取第一个工作表；行号取工作表实际行号（从 1 开始）
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_bytes(&self, entity_type: EntityType, bytes: &[u8]) -> ParseOutcome {
        let file_error = |message: String| {
            vec![ParseError::file_level(
                entity_type,
                ParseErrorKind::MalformedRow,
                message,
            )]
        };

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| file_error(format!("Excel 解析失败: {}", e)))?;

        let sheet_name = match workbook.sheet_names().first() {
            Some(name) => name.clone(),
            None => {
                return Err(vec![ParseError::file_level(
                    entity_type,
                    ParseErrorKind::EmptyFile,
                    "Excel 文件无工作表".to_string(),
                )])
            }
        };

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| file_error(format!("工作表读取失败: {}", e)))?;

        let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
        let mut classifier = RowClassifier::new(entity_type);
        for (offset, data_row) in range.rows().enumerate() {
            let cells: Vec<String> = data_row.iter().map(|cell| cell.to_string()).collect();
            classifier.accept_cells(first_row + offset + 1, cells)?;
        }

        classifier.finish()
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl UniversalFileParser {
    fn parser_for(file_name: &str) -> MigrationResult<&'static dyn FileParser> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => Ok(&CsvParser),
            "xlsx" | "xls" => Ok(&ExcelParser),
            _ => Err(MigrationError::UnsupportedFormat(ext)),
        }
    }

    /// 按文件名扩展名解析上传内容
    pub fn parse_upload(
        &self,
        entity_type: EntityType,
        file_name: &str,
        bytes: &[u8],
    ) -> MigrationResult<ParseOutcome> {
        let parser = Self::parser_for(file_name)?;
        Ok(parser.parse_bytes(entity_type, bytes))
    }

    /// 解析磁盘文件
    pub fn parse_path<P: AsRef<Path>>(
        &self,
        entity_type: EntityType,
        file_path: P,
    ) -> MigrationResult<ParseOutcome> {
        let path = file_path.as_ref();
        if !path.exists() {
            return Err(MigrationError::FileNotFound(path.display().to_string()));
        }
        let parser = Self::parser_for(&path.to_string_lossy())?;
        let bytes = std::fs::read(path)?;
        Ok(parser.parse_bytes(entity_type, &bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(text: &[u8]) -> ParseOutcome {
        CsvParser.parse_bytes(EntityType::Accounts, text)
    }

    #[test]
    fn test_csv_parser_valid_file() {
        let file = parse(b"Legacy ID,Company Name\nA1,Acme\nA2,Globex\n").unwrap();

        assert_eq!(file.header_row, vec!["Legacy ID", "Company Name"]);
        assert_eq!(file.rows.len(), 2);
        assert_eq!(file.row_count, 2);
        assert_eq!(file.rows[0].source_row_index, 2);
        assert_eq!(file.rows[1].cells, vec!["A2", "Globex"]);
    }

    #[test]
    fn test_csv_parser_strips_bom_and_leading_blank_rows() {
        let file = parse(b"\xEF\xBB\xBF,\nid,name\nA1,Acme\n").unwrap();
        assert_eq!(file.header_row, vec!["id", "name"]);
        assert_eq!(file.rows.len(), 1);
    }

    #[test]
    fn test_csv_parser_skip_empty_rows() {
        let file = parse(b"id,name\nA1,Acme\n,\nA2,Globex\n").unwrap();
        assert_eq!(file.rows.len(), 2);
        assert_eq!(file.row_count, 2);
    }

    #[test]
    fn test_csv_parser_column_count_mismatch_is_row_scoped() {
        let file = parse(b"id,name\nA1,Acme\nA2\nA3,Initech\n").unwrap();

        assert_eq!(file.rows.len(), 2);
        assert_eq!(file.row_count, 3);
        assert_eq!(file.row_errors.len(), 1);
        let err = &file.row_errors[0];
        assert_eq!(err.kind, ParseErrorKind::ColumnCountMismatch);
        assert_eq!(err.source_row_index, Some(3));
        assert_eq!(err.raw_values.get("id").map(String::as_str), Some("A2"));
    }

    #[test]
    fn test_csv_parser_invalid_utf8_is_row_scoped() {
        let file = parse(b"id,name\nA1,Acme\nA2,\xFF\xFE\n").unwrap();
        assert_eq!(file.rows.len(), 1);
        assert_eq!(file.row_errors[0].kind, ParseErrorKind::Encoding);
    }

    #[test]
    fn test_csv_parser_duplicate_header() {
        let errors = parse(b"id,Name,name\nA1,x,y\n").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ParseErrorKind::DuplicateHeader);
        assert!(!errors[0].is_row_scoped());
    }

    #[test]
    fn test_csv_parser_empty_file() {
        let errors = parse(b"").unwrap_err();
        assert_eq!(errors[0].kind, ParseErrorKind::EmptyFile);
        let errors = parse(b"\n,,\n").unwrap_err();
        assert_eq!(errors[0].kind, ParseErrorKind::EmptyFile);
    }

    #[test]
    fn test_universal_parser_dispatch() {
        let mut temp_file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(temp_file, "id,name").unwrap();
        writeln!(temp_file, "A1,Acme").unwrap();

        let file = UniversalFileParser
            .parse_path(EntityType::Accounts, temp_file.path())
            .unwrap()
            .unwrap();
        assert_eq!(file.rows.len(), 1);
    }

    #[test]
    fn test_universal_parser_rejects_unknown_extension() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension("txt");
        std::fs::write(&path, "id\n").unwrap();

        let result = UniversalFileParser.parse_path(EntityType::Accounts, &path);
        assert!(matches!(result, Err(MigrationError::UnsupportedFormat(_))));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_universal_parser_file_not_found() {
        let result = UniversalFileParser.parse_path(EntityType::Accounts, "non_existent.csv");
        assert!(matches!(result, Err(MigrationError::FileNotFound(_))));
    }
}
