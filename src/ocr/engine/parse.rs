use crate::ocr::{BBoxPx, RecognizedToken};

const COL_LEFT: usize = 6;
const COL_TOP: usize = 7;
const COL_WIDTH: usize = 8;
const COL_HEIGHT: usize = 9;
const COL_CONF: usize = 10;
const COL_TEXT: usize = 11;

/// Parses tesseract TSV output into tokens, one per data row, in row order.
///
/// Rows of every level are kept (page/block/line rows carry empty text and a
/// confidence of -1), so `id` matches the row index of the engine output.
/// Filtering is left to the caller.
pub(super) fn parse_tsv_tokens(tsv: &str) -> Vec<RecognizedToken> {
    let mut tokens = Vec::new();
    for (id, row) in tsv.lines().skip(1).enumerate() {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() <= COL_CONF {
            continue;
        }
        let number = |idx: usize| cols[idx].trim().parse::<u32>().unwrap_or(0);
        tokens.push(RecognizedToken {
            id,
            text: cols.get(COL_TEXT).copied().unwrap_or("").to_string(),
            conf: parse_conf(cols[COL_CONF]),
            bbox: BBoxPx {
                x: number(COL_LEFT),
                y: number(COL_TOP),
                w: number(COL_WIDTH),
                h: number(COL_HEIGHT),
            },
        });
    }
    tokens
}

fn parse_conf(raw: &str) -> f32 {
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(-1.0)
}
