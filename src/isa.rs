//! ISA string parsing
//!
//! Grounded on `processor_t::parse_isa_string` in
//! `examples/original_source/riscv/processor.cc`: an optional `RV32`/`RV64`/
//! `RV` prefix (longest match first, matching the original's
//! `strncmp`-chain; a bare `"RV"` with no xlen digits is valid and defaults
//! to 64, same as the original's `max_xlen = 64` pre-set), followed by
//! extension letters in canonical order, optionally followed by one or more
//! `X<name>` custom-extension tokens separated by underscores. The original
//! calls `abort()` on a bad string; this crate returns
//! `ConfigError::BadIsaString` instead (spec.md §7, `Hart::new` is fallible,
//! see DESIGN.md).

use crate::trap::ConfigError;

/// The parsed extension set. Booleans rather than a bitset, matching the
/// original's `extension_table[256]` in spirit but sized to what this
/// simulator actually decodes (spec.md §4.6 handler families).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Extensions {
    pub m: bool,
    pub a: bool,
    pub f: bool,
    pub d: bool,
    pub c: bool,
    /// The custom tag-memory extension (`Xtag`): `LDCT`/`SDCT` plus the two
    /// `CSR_LD_TAG`/`CSR_SD_TAG` CSRs (spec.md §3).
    pub xtag: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Isa {
    pub xlen: u32,
    pub extensions: Extensions,
}

impl Isa {
    /// Parse an ISA string such as `"RV64IMAFDC_Xtag"`. `I` is mandatory
    /// (base integer ISA); `D` requires `F` (double precision builds on the
    /// single-precision register file), matching the original's
    /// `if (extension_table['D'] && !extension_table['F']) bad_isa_string(...)`.
    pub fn parse(isa: &str) -> Result<Isa, ConfigError> {
        let bad = || ConfigError::BadIsaString(isa.to_string());

        // Longest-match first, the same order the original checks
        // "RV32"/"RV64"/"RV": a bare "RV" with no xlen digits at all is
        // valid grammar and defaults to 64 (spec.md §1's "optional
        // RV32|RV64|RV" prefix).
        let (xlen, mut tail) = if let Some(rest) = isa.strip_prefix("RV32") {
            (32, rest)
        } else if let Some(rest) = isa.strip_prefix("RV64") {
            (64, rest)
        } else if let Some(rest) = isa.strip_prefix("RV") {
            (64, rest)
        } else {
            return Err(bad());
        };

        let mut ext = Extensions::default();
        let mut have_i = false;
        let mut have_f = false;

        loop {
            let c = match tail.chars().next() {
                Some(c) => c,
                None => break,
            };
            if c == '_' {
                break;
            }
            match c.to_ascii_uppercase() {
                'I' => have_i = true,
                'M' => ext.m = true,
                'A' => ext.a = true,
                'F' => {
                    ext.f = true;
                    have_f = true;
                }
                'D' => ext.d = true,
                'C' => ext.c = true,
                'G' => {
                    // "G" is shorthand for IMAFD, per the standard ISA grammar.
                    have_i = true;
                    ext.m = true;
                    ext.a = true;
                    ext.f = true;
                    have_f = true;
                    ext.d = true;
                }
                _ => return Err(bad()),
            }
            tail = &tail[c.len_utf8()..];
        }

        while let Some(stripped) = tail.strip_prefix('_') {
            tail = stripped;
            let end = tail.find('_').unwrap_or(tail.len());
            let (token, rest) = tail.split_at(end);
            if token.eq_ignore_ascii_case("Xtag") {
                ext.xtag = true;
            } else if !token.is_empty() {
                return Err(bad());
            }
            tail = rest;
        }

        if !tail.is_empty() {
            return Err(bad());
        }
        if !have_i {
            return Err(bad());
        }
        if ext.d && !have_f {
            return Err(bad());
        }

        Ok(Isa {
            xlen,
            extensions: ext,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_extension_list() {
        let isa = Isa::parse("RV64IMAFDC_Xtag").unwrap();
        assert_eq!(isa.xlen, 64);
        assert!(isa.extensions.m && isa.extensions.a && isa.extensions.f);
        assert!(isa.extensions.d && isa.extensions.c && isa.extensions.xtag);
    }

    #[test]
    fn rejects_d_without_f() {
        assert!(Isa::parse("RV64IDC").is_err());
    }

    #[test]
    fn rejects_missing_i() {
        assert!(Isa::parse("RV64MAC").is_err());
    }

    #[test]
    fn rejects_unknown_xext() {
        assert!(Isa::parse("RV64I_Xbogus").is_err());
    }

    #[test]
    fn bare_rv_prefix_defaults_to_xlen_64() {
        let isa = Isa::parse("RVIMAFDC_Xtag").unwrap();
        assert_eq!(isa.xlen, 64);
        assert!(isa.extensions.xtag);
    }

    #[test]
    fn g_expands_to_imafd() {
        let isa = Isa::parse("RV64GC").unwrap();
        assert!(isa.extensions.m && isa.extensions.a && isa.extensions.f && isa.extensions.d);
        assert!(isa.extensions.c);
    }
}
