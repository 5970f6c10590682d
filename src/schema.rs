//! Quality encodings and Phred score decoding.

use crate::error::{FastqError, SchemaViolation};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Quality-character encoding convention selected at parser construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QualitySchema {
    /// Phred+33 without range checking beyond non-negative scores.
    #[default]
    Generic,
    Sanger,
    Solexa,
    Illumina13,
    Illumina15,
    Illumina18,
}

impl QualitySchema {
    pub const ALL: [QualitySchema; 6] = [
        QualitySchema::Generic,
        QualitySchema::Sanger,
        QualitySchema::Solexa,
        QualitySchema::Illumina13,
        QualitySchema::Illumina15,
        QualitySchema::Illumina18,
    ];

    /// ASCII value subtracted from each quality byte.
    pub const fn offset(self) -> u8 {
        match self {
            Self::Generic | Self::Sanger | Self::Illumina18 => 33,
            Self::Solexa | Self::Illumina13 | Self::Illumina15 => 64,
        }
    }

    /// Inclusive range of quality bytes the schema accepts.
    pub const fn valid_range(self) -> (u8, u8) {
        match self {
            Self::Generic => (33, 255),
            Self::Sanger | Self::Illumina18 => (33, 126),
            Self::Solexa => (59, 126),
            Self::Illumina13 => (64, 126),
            Self::Illumina15 => (66, 126),
        }
    }

    /// Selector string, as accepted by [`FromStr`].
    pub const fn name(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Sanger => "sanger",
            Self::Solexa => "solexa",
            Self::Illumina13 => "illumina_1.3",
            Self::Illumina15 => "illumina_1.5",
            Self::Illumina18 => "illumina_1.8",
        }
    }

    /// Decode raw quality bytes to Phred scores.
    pub fn decode(self, quality: &[u8]) -> Result<Vec<i16>, FastqError> {
        let table = self.table();
        let mut scores = Vec::with_capacity(quality.len());
        for (position, &byte) in quality.iter().enumerate() {
            let score = table[byte as usize];
            if score == INVALID {
                return Err(self.violation(byte, position).into());
            }
            scores.push(score);
        }
        Ok(scores)
    }

    /// Check every byte against the schema without materializing scores.
    pub fn validate(self, quality: &[u8]) -> Result<(), SchemaViolation> {
        let table = self.table();
        match quality.iter().position(|&b| table[b as usize] == INVALID) {
            Some(position) => Err(self.violation(quality[position], position)),
            None => Ok(()),
        }
    }

    fn violation(self, byte: u8, position: usize) -> SchemaViolation {
        let (lower, upper) = self.valid_range();
        SchemaViolation {
            schema: self,
            byte,
            position,
            lower,
            upper,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Generic => 0,
            Self::Sanger => 1,
            Self::Solexa => 2,
            Self::Illumina13 => 3,
            Self::Illumina15 => 4,
            Self::Illumina18 => 5,
        }
    }

    fn table(self) -> &'static ScoreTable {
        &score_tables()[self.index()]
    }
}

impl fmt::Display for QualitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QualitySchema {
    type Err = FastqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|schema| schema.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| FastqError::InvalidArgument(format!("unknown quality schema '{s}'")))
    }
}

type ScoreTable = [i16; 256];

const INVALID: i16 = i16::MIN;

fn score_tables() -> &'static [ScoreTable; 6] {
    static TABLES: OnceLock<[ScoreTable; 6]> = OnceLock::new();
    TABLES.get_or_init(|| QualitySchema::ALL.map(build_table))
}

fn build_table(schema: QualitySchema) -> ScoreTable {
    let (lower, upper) = schema.valid_range();
    let offset = i16::from(schema.offset());
    let mut table = [INVALID; 256];
    for byte in lower..=upper {
        table[byte as usize] = i16::from(byte) - offset;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanger_scores() {
        let scores = QualitySchema::Sanger.decode(b"!+5?I").unwrap();
        assert_eq!(scores, vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn solexa_allows_negative_scores() {
        let scores = QualitySchema::Solexa.decode(b";@h").unwrap();
        assert_eq!(scores, vec![-5, 0, 40]);
    }

    #[test]
    fn illumina15_rejects_below_b() {
        let err = QualitySchema::Illumina15.validate(b"BBA").unwrap_err();
        assert_eq!(err.byte, b'A');
        assert_eq!(err.position, 2);
        assert_eq!((err.lower, err.upper), (66, 126));
    }

    #[test]
    fn generic_only_rejects_negative_scores() {
        assert_eq!(QualitySchema::Generic.decode(&[0x7f, 0xff]).unwrap(), vec![94, 222]);
        assert!(QualitySchema::Generic.decode(b" ").is_err());
    }

    #[test]
    fn selector_round_trip() {
        for schema in QualitySchema::ALL {
            assert_eq!(schema.name().parse::<QualitySchema>().unwrap(), schema);
        }
        assert!(matches!(
            "phred64".parse::<QualitySchema>(),
            Err(FastqError::InvalidArgument(_))
        ));
    }
}
