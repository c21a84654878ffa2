//! Tokenizer / detokenizer (spec §4.1): source text <-> single-byte
//! token stream, with the context-sensitive rules for strings, `REM`
//! and `DATA` tails, `?` as a `PRINT` abbreviation, and `GO TO`
//! coalescing.
//!
//! The token table and its byte values are lifted from the teacher's
//! `prg_loader.rs`, which already carries the authentic C64 BASIC V2
//! token assignments starting at 128. Spec §4.1 requires token values
//! be stable across instances for `SAVE`/`LOAD` interop, so this table
//! is the single source of truth shared by the tokenizer and the PRG
//! loader/saver in `prg.rs`.

/// Token byte for the statement emitted when a `?` shorthand is seen
/// outside a string (spec §4.1: "`?` outside a string emits the `PRINT`
/// token").
pub const TOK_PRINT: u8 = token_for("PRINT");
pub const TOK_REM: u8 = token_for("REM");
pub const TOK_DATA: u8 = token_for("DATA");
pub const TOK_GO: u8 = token_for("GO");
pub const TOK_TO: u8 = token_for("TO");
pub const TOK_GOTO: u8 = token_for("GOTO");
pub const TOK_THEN: u8 = token_for("THEN");
pub const TOK_IF: u8 = token_for("IF");
pub const TOK_FOR: u8 = token_for("FOR");
pub const TOK_NEXT: u8 = token_for("NEXT");
pub const TOK_STEP: u8 = token_for("STEP");
pub const TOK_LET: u8 = token_for("LET");
pub const TOK_GOSUB: u8 = token_for("GOSUB");
pub const TOK_RETURN: u8 = token_for("RETURN");
pub const TOK_DIM: u8 = token_for("DIM");
pub const TOK_READ: u8 = token_for("READ");
pub const TOK_RESTORE: u8 = token_for("RESTORE");
pub const TOK_POKE: u8 = token_for("POKE");
pub const TOK_SAVE: u8 = token_for("SAVE");
pub const TOK_LOAD: u8 = token_for("LOAD");
pub const TOK_GET: u8 = token_for("GET");
pub const TOK_END: u8 = token_for("END");
pub const TOK_STOP: u8 = token_for("STOP");
pub const TOK_CONT: u8 = token_for("CONT");
pub const TOK_NEW: u8 = token_for("NEW");
pub const TOK_LIST: u8 = token_for("LIST");
pub const TOK_RUN: u8 = token_for("RUN");
pub const TOK_CLR: u8 = token_for("CLR");
pub const TOK_INPUT: u8 = token_for("INPUT");
pub const TOK_ON: u8 = token_for("ON");
pub const TOK_DEF: u8 = token_for("DEF");
pub const TOK_FN: u8 = token_for("FN");
pub const TOK_TAB: u8 = token_for("TAB(");
pub const TOK_SPC: u8 = token_for("SPC(");
pub const TOK_AND: u8 = token_for("AND");
pub const TOK_OR: u8 = token_for("OR");
pub const TOK_NOT: u8 = token_for("NOT");
pub const TOK_PLUS: u8 = token_for("+");
pub const TOK_MINUS: u8 = token_for("-");
pub const TOK_STAR: u8 = token_for("*");
pub const TOK_SLASH: u8 = token_for("/");
pub const TOK_CARET: u8 = token_for("^");
pub const TOK_GT: u8 = token_for(">");
pub const TOK_EQ: u8 = token_for("=");
pub const TOK_LT: u8 = token_for("<");
pub const TOK_SGN: u8 = token_for("SGN");
pub const TOK_INT: u8 = token_for("INT");
pub const TOK_ABS: u8 = token_for("ABS");
pub const TOK_FRE: u8 = token_for("FRE");
pub const TOK_POS: u8 = token_for("POS");
pub const TOK_SQR: u8 = token_for("SQR");
pub const TOK_RND: u8 = token_for("RND");
pub const TOK_LOG: u8 = token_for("LOG");
pub const TOK_EXP: u8 = token_for("EXP");
pub const TOK_COS: u8 = token_for("COS");
pub const TOK_SIN: u8 = token_for("SIN");
pub const TOK_TAN: u8 = token_for("TAN");
pub const TOK_ATN: u8 = token_for("ATN");
pub const TOK_PEEK: u8 = token_for("PEEK");
pub const TOK_LEN: u8 = token_for("LEN");
pub const TOK_STR: u8 = token_for("STR$");
pub const TOK_VAL: u8 = token_for("VAL");
pub const TOK_ASC: u8 = token_for("ASC");
pub const TOK_CHR: u8 = token_for("CHR$");
pub const TOK_LEFT: u8 = token_for("LEFT$");
pub const TOK_RIGHT: u8 = token_for("RIGHT$");
pub const TOK_MID: u8 = token_for("MID$");

/// The full C64 BASIC V2 token table: index 0 is token 128, and so on.
pub const TOKENS: &[&str] = &[
    "END",      // 128 / $80
    "FOR",      // 129 / $81
    "NEXT",     // 130 / $82
    "DATA",     // 131 / $83
    "INPUT#",   // 132 / $84
    "INPUT",    // 133 / $85
    "DIM",      // 134 / $86
    "READ",     // 135 / $87
    "LET",      // 136 / $88
    "GOTO",     // 137 / $89
    "RUN",      // 138 / $8A
    "IF",       // 139 / $8B
    "RESTORE",  // 140 / $8C
    "GOSUB",    // 141 / $8D
    "RETURN",   // 142 / $8E
    "REM",      // 143 / $8F
    "STOP",     // 144 / $90
    "ON",       // 145 / $91
    "WAIT",     // 146 / $92
    "LOAD",     // 147 / $93
    "SAVE",     // 148 / $94
    "VERIFY",   // 149 / $95
    "DEF",      // 150 / $96
    "POKE",     // 151 / $97
    "PRINT#",   // 152 / $98
    "PRINT",    // 153 / $99
    "CONT",     // 154 / $9A
    "LIST",     // 155 / $9B
    "CLR",      // 156 / $9C
    "CMD",      // 157 / $9D
    "SYS",      // 158 / $9E
    "OPEN",     // 159 / $9F
    "CLOSE",    // 160 / $A0
    "GET",      // 161 / $A1
    "NEW",      // 162 / $A2
    "TAB(",     // 163 / $A3
    "TO",       // 164 / $A4
    "FN",       // 165 / $A5
    "SPC(",     // 166 / $A6
    "THEN",     // 167 / $A7
    "NOT",      // 168 / $A8
    "STEP",     // 169 / $A9
    "+",        // 170 / $AA
    "-",        // 171 / $AB
    "*",        // 172 / $AC
    "/",        // 173 / $AD
    "^",        // 174 / $AE
    "AND",      // 175 / $AF
    "OR",       // 176 / $B0
    ">",        // 177 / $B1
    "=",        // 178 / $B2
    "<",        // 179 / $B3
    "SGN",      // 180 / $B4
    "INT",      // 181 / $B5
    "ABS",      // 182 / $B6
    "USR",      // 183 / $B7
    "FRE",      // 184 / $B8
    "POS",      // 185 / $B9
    "SQR",      // 186 / $BA
    "RND",      // 187 / $BB
    "LOG",      // 188 / $BC
    "EXP",      // 189 / $BD
    "COS",      // 190 / $BE
    "SIN",      // 191 / $BF
    "TAN",      // 192 / $C0
    "ATN",      // 193 / $C1
    "PEEK",     // 194 / $C2
    "LEN",      // 195 / $C3
    "STR$",     // 196 / $C4
    "VAL",      // 197 / $C5
    "ASC",      // 198 / $C6
    "CHR$",     // 199 / $C7
    "LEFT$",    // 200 / $C8
    "RIGHT$",   // 201 / $C9
    "MID$",     // 202 / $CA
    "GO",       // 203 / $CB
];

pub const TOKEN_BASE: u8 = 128;
pub const QUOTE: u8 = b'"';
pub const COLON: u8 = b':';

/// Compile-time lookup of a keyword's token byte, used only to name the
/// `TOK_*` constants above.
const fn token_for(keyword: &str) -> u8 {
    let mut i = 0;
    while i < TOKENS.len() {
        if str_eq(TOKENS[i], keyword) {
            return TOKEN_BASE + i as u8;
        }
        i += 1;
    }
    panic!("keyword not present in TOKENS table");
}

const fn str_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Tokenize one line of source (no line number, no trailing newline):
/// the statement body only. Line-number parsing is the caller's job
/// (`program.rs`), since direct-mode lines never carry one.
pub fn tokenize(source: &str) -> Vec<u8> {
    let bytes = source.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut in_string = false;
    let mut in_rem = false;
    let mut in_data = false;

    // Sort candidate keywords longest-first so e.g. "GOTO" isn't matched
    // as "GO" + "TO" when it's spelled out directly, and so multi-letter
    // keywords win over shorter prefixes.
    while i < bytes.len() {
        let b = bytes[i];

        if in_rem {
            out.push(b);
            i += 1;
            continue;
        }

        if b == QUOTE {
            in_string = !in_string;
            out.push(b);
            i += 1;
            continue;
        }

        if in_string {
            out.push(b);
            i += 1;
            continue;
        }

        if in_data {
            if b == COLON {
                in_data = false;
                out.push(b);
                i += 1;
            } else {
                out.push(b);
                i += 1;
            }
            continue;
        }

        if b == b'?' {
            out.push(TOK_PRINT);
            i += 1;
            continue;
        }

        // GO TO -> single GOTO token (spec §4.1).
        if matches_word(bytes, i, "GO") {
            let after_go = i + 2;
            let mut j = after_go;
            while j < bytes.len() && bytes[j] == b' ' {
                j += 1;
            }
            if matches_word(bytes, j, "TO") {
                out.push(TOK_GOTO);
                i = j + 2;
                continue;
            }
        }

        if let Some((token, len)) = longest_keyword_match(bytes, i) {
            out.push(token);
            i += len;
            if token == TOK_REM {
                in_rem = true;
            } else if token == TOK_DATA {
                in_data = true;
            }
            continue;
        }

        out.push(b);
        i += 1;
    }

    out
}

/// Does `bytes[pos..]` start with `word` (case-insensitive on letters),
/// without that match being a prefix of a longer identifier?
fn matches_word(bytes: &[u8], pos: usize, word: &str) -> bool {
    let w = word.as_bytes();
    if pos + w.len() > bytes.len() {
        return false;
    }
    for (k, &wc) in w.iter().enumerate() {
        if bytes[pos + k].to_ascii_uppercase() != wc {
            return false;
        }
    }
    // FN is always followed directly by its one-letter function name
    // with no separating space (FNA tokenizes as FN+A), unlike every
    // other reserved word.
    let last_is_letter = w.last().map_or(false, |c| c.is_ascii_alphabetic());
    if last_is_letter && word != "FN" {
        if let Some(&next) = bytes.get(pos + w.len()) {
            if next.is_ascii_alphabetic() {
                return false;
            }
        }
    }
    true
}

/// Find the longest reserved word matching at `pos`, preferring longer
/// keywords over shorter prefixes (spec §4.1).
fn longest_keyword_match(bytes: &[u8], pos: usize) -> Option<(u8, usize)> {
    let mut best: Option<(u8, usize)> = None;
    for (idx, &kw) in TOKENS.iter().enumerate() {
        if matches_word(bytes, pos, kw) {
            let len = kw.len();
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((TOKEN_BASE + idx as u8, len));
            }
        }
    }
    best
}

/// Detokenize a byte stream back to canonical uppercase source text.
/// Exact inverse for bytes >= 128; bytes < 128 print as themselves.
pub fn detokenize(tokens: &[u8]) -> String {
    let mut out = String::with_capacity(tokens.len() * 2);
    let mut in_rem = false;
    for &b in tokens {
        if in_rem {
            out.push(b as char);
            continue;
        }
        if b >= TOKEN_BASE {
            let idx = (b - TOKEN_BASE) as usize;
            if let Some(&word) = TOKENS.get(idx) {
                out.push_str(word);
                if b == TOK_REM {
                    in_rem = true;
                }
                continue;
            }
        }
        out.push(b as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_abbreviation_tokenizes_to_print() {
        let t = tokenize("?\"HELLO\"");
        assert_eq!(t[0], TOK_PRINT);
    }

    #[test]
    fn go_to_coalesces_into_single_goto_token() {
        let t = tokenize("GO TO 100");
        assert_eq!(t[0], TOK_GOTO);
    }

    #[test]
    fn go_to_without_space_also_coalesces() {
        let t = tokenize("GOTO100");
        assert_eq!(t[0], TOK_GOTO);
    }

    #[test]
    fn string_literal_passes_through_verbatim_including_keywords() {
        let t = tokenize("\"FOR NEXT\"");
        let s = String::from_utf8(t.clone()).unwrap();
        assert_eq!(s, "\"FOR NEXT\"");
    }

    #[test]
    fn rem_tail_is_not_tokenized() {
        let t = tokenize("REM GOTO 10");
        assert_eq!(t[0], TOK_REM);
        // everything after REM passed through as raw ASCII, not GOTO token
        assert!(!t[1..].contains(&TOK_GOTO));
    }

    #[test]
    fn data_tail_passes_through_until_colon() {
        let t = tokenize("DATA FOR,NEXT:PRINT 1");
        assert_eq!(t[0], TOK_DATA);
        assert!(!t.contains(&TOK_FOR));
        assert!(t.contains(&TOK_PRINT));
    }

    #[test]
    fn keyword_does_not_consume_longer_identifier_prefix() {
        // TOAST starts with TO, but TO must not match inside it.
        let t = tokenize("TOAST=1");
        assert!(!t.contains(&TOK_TO));
    }

    #[test]
    fn detokenize_is_inverse_of_tokenize_for_canonical_source() {
        let src = "FOR I=1 TO 10 STEP 2";
        let t = tokenize(src);
        let back = detokenize(&t);
        let retok = tokenize(&back);
        assert_eq!(t, retok);
    }

    #[test]
    fn two_char_comparisons_tokenize_as_two_single_byte_tokens() {
        let t = tokenize("A<=B");
        assert_eq!(t, vec![b'A', TOK_LT, TOK_EQ, b'B']);
    }

    #[test]
    fn fn_tokenizes_even_directly_against_its_one_letter_name() {
        // Unlike every other reserved word, FN is tokenized even when the
        // next source byte is a letter: FNA is FN+A, not a FN-prefixed
        // identifier left untokenized.
        let t = tokenize("FNA(3)");
        assert_eq!(t[0], TOK_FN);
        assert_eq!(t[1], b'A');
    }
}
