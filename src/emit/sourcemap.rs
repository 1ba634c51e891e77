// ABOUTME: Source-map v3 builder with base64-VLQ mapping encoding

use serde::Serialize;

/// One mapping record tying a generated position back to the source.
/// All fields are 0-based, as the source-map format requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    pub source_index: u32,
    pub source_line: u32,
    pub source_column: u32,
    pub name_index: Option<u32>,
}

/// Accumulates mappings while the emitter writes text
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    pub mappings: Vec<Mapping>,
    sources: Vec<String>,
    names: Vec<String>,
}

impl SourceMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, path: &str) -> u32 {
        if let Some(i) = self.sources.iter().position(|s| s == path) {
            return i as u32;
        }
        self.sources.push(path.to_string());
        (self.sources.len() - 1) as u32
    }

    pub fn name_index(&mut self, name: &str) -> u32 {
        if let Some(i) = self.names.iter().position(|n| n == name) {
            return i as u32;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u32
    }

    pub fn add_mapping(&mut self, mapping: Mapping) {
        self.mappings.push(mapping);
    }

    /// Serialize to standard source-map v3 JSON
    pub fn to_json(&self, file: &str) -> String {
        #[derive(Serialize)]
        struct MapJson<'a> {
            version: u8,
            file: &'a str,
            sources: &'a [String],
            names: &'a [String],
            mappings: String,
        }
        let json = MapJson {
            version: 3,
            file,
            sources: &self.sources,
            names: &self.names,
            mappings: self.encode_mappings(),
        };
        serde_json::to_string(&json).expect("source map serializes")
    }

    /// Inline form: a trailing comment carrying the map as a data URL
    pub fn to_inline_comment(&self, file: &str) -> String {
        inline_comment(&self.to_json(file))
    }

    /// Segments are delta-encoded per the format: columns reset per line,
    /// everything else carries across lines
    fn encode_mappings(&self) -> String {
        let mut sorted: Vec<&Mapping> = self.mappings.iter().collect();
        sorted.sort_by_key(|m| (m.generated_line, m.generated_column));

        let mut out = String::new();
        let mut current_line = 0u32;
        let mut prev_gen_col = 0i64;
        let mut prev_src_idx = 0i64;
        let mut prev_src_line = 0i64;
        let mut prev_src_col = 0i64;
        let mut prev_name = 0i64;
        let mut first_in_line = true;

        for m in sorted {
            while current_line < m.generated_line {
                out.push(';');
                current_line += 1;
                prev_gen_col = 0;
                first_in_line = true;
            }
            if !first_in_line {
                out.push(',');
            }
            first_in_line = false;

            encode_vlq(&mut out, m.generated_column as i64 - prev_gen_col);
            prev_gen_col = m.generated_column as i64;

            encode_vlq(&mut out, m.source_index as i64 - prev_src_idx);
            prev_src_idx = m.source_index as i64;

            encode_vlq(&mut out, m.source_line as i64 - prev_src_line);
            prev_src_line = m.source_line as i64;

            encode_vlq(&mut out, m.source_column as i64 - prev_src_col);
            prev_src_col = m.source_column as i64;

            if let Some(name) = m.name_index {
                encode_vlq(&mut out, name as i64 - prev_name);
                prev_name = name as i64;
            }
        }
        out
    }
}

/// Inline source-map comment for an already serialized map
pub fn inline_comment(map_json: &str) -> String {
    format!(
        "//# sourceMappingURL=data:application/json;base64,{}",
        base64(map_json.as_bytes())
    )
}

const VLQ_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 {
        (((-value) as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (vlq & 0b11111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b100000;
        }
        out.push(VLQ_CHARS[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

fn base64(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b = [
            chunk[0],
            chunk.get(1).copied().unwrap_or(0),
            chunk.get(2).copied().unwrap_or(0),
        ];
        let n = ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32;
        out.push(VLQ_CHARS[(n >> 18) as usize & 63] as char);
        out.push(VLQ_CHARS[(n >> 12) as usize & 63] as char);
        out.push(if chunk.len() > 1 {
            VLQ_CHARS[(n >> 6) as usize & 63] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            VLQ_CHARS[n as usize & 63] as char
        } else {
            '='
        });
    }
    out
}
