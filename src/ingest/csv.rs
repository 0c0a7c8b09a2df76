use std::collections::HashMap;

/// 极简 CSV 读取：首行为表头，支持 RFC4180 的引号字段（含逗号、换行、`""` 转义）。
///
/// 结构性错误（未闭合引号、行列数不一致）让整个文件解析失败；
/// 单条记录内容层面的取舍是 loader 的事，不在这里做。
pub fn parse(input: &str) -> anyhow::Result<Vec<HashMap<String, String>>> {
    let records = read_records(input)?;
    let mut iter = records.into_iter();
    let Some(headers) = iter.next() else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for (line_no, record) in iter.enumerate() {
        if record.len() != headers.len() {
            anyhow::bail!(
                "record {}: {} columns, header has {}",
                line_no + 2,
                record.len(),
                headers.len()
            );
        }
        out.push(headers.iter().cloned().zip(record).collect());
    }
    Ok(out)
}

fn read_records(input: &str) -> anyhow::Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {} // CRLF：\n 统一收尾
            '\n' => {
                record.push(std::mem::take(&mut field));
                // 空行整体跳过
                if !(record.len() == 1 && record[0].is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        anyhow::bail!("unterminated quoted field");
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}
