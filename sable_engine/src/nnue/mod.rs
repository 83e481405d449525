
pub mod accumulator;

pub use self::accumulator::Accumulator;

use crate::position::Position;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chess::{Color, Piece, Square};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const MAGIC: [u8; 4] = *b"SBNN";
pub const VERSION: u32 = 1;

/// (piece type, piece colour relative to perspective, oriented square)
pub const INPUT_DIM: usize = 6 * 2 * 64;

pub const MAX_HIDDEN: usize = 256;
pub const MAX_VARIANTS: usize = 8;

/// Network output units per 1.0 in logistic space.
pub const OUTPUT_SCALE: i32 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayer {
    /// int8 weights over both perspectives' clipped activations, side to
    /// move first.
    pub weights: Vec<i8>,
    pub bias: i32,
}

/// Quantized network: int16 feature transformer, int8 output layers selected
/// by a piece-count bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedNetwork {
    pub hidden: usize,
    pub ft_weights: Vec<i16>,
    pub ft_bias: Vec<i16>,
    pub variants: Vec<OutputLayer>,
    /// activation clip ceiling
    pub qa: i32,
    /// output weight quantization scale
    pub qb: i32,
}

/// Construction
impl PackedNetwork {
    pub fn arch_hash(hidden: usize, num_variants: usize) -> u32 {
        let mut h: u32 = 0x5ab1_e000;
        h = h.wrapping_mul(31).wrapping_add(INPUT_DIM as u32);
        h = h.wrapping_mul(31).wrapping_add(hidden as u32);
        h = h.wrapping_mul(31).wrapping_add(num_variants as u32);
        h ^ VERSION
    }

    /// A deterministic pseudo-random network, for tests and tooling.
    pub fn random(seed: u64, hidden: usize, num_variants: usize) -> Self {
        assert!(hidden <= MAX_HIDDEN && num_variants <= MAX_VARIANTS);
        let mut state = seed | 1;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let ft_weights = (0..INPUT_DIM * hidden)
            .map(|_| (next() % 17) as i16 - 8)
            .collect();
        let ft_bias = (0..hidden).map(|_| (next() % 33) as i16 - 16).collect();
        let variants = (0..num_variants)
            .map(|_| OutputLayer {
                weights: (0..2 * hidden).map(|_| (next() % 11) as i8 - 5).collect(),
                bias: (next() % 65) as i32 - 32,
            })
            .collect();

        Self {
            hidden,
            ft_weights,
            ft_bias,
            variants,
            qa: 255,
            qb: 64,
        }
    }
}

/// File I/O
impl PackedNetwork {
    pub fn write_network<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let f = File::create(path)?;
        let mut w = BufWriter::new(f);

        w.write_all(&MAGIC)?;
        w.write_u32::<LittleEndian>(VERSION)?;
        w.write_u32::<LittleEndian>(Self::arch_hash(self.hidden, self.variants.len()))?;
        w.write_u32::<LittleEndian>(INPUT_DIM as u32)?;
        w.write_u32::<LittleEndian>(self.hidden as u32)?;
        w.write_u32::<LittleEndian>(self.variants.len() as u32)?;
        w.write_u16::<LittleEndian>(self.qa as u16)?;
        w.write_u16::<LittleEndian>(self.qb as u16)?;

        for &x in &self.ft_weights {
            w.write_i16::<LittleEndian>(x)?;
        }
        for &x in &self.ft_bias {
            w.write_i16::<LittleEndian>(x)?;
        }
        for layer in &self.variants {
            for &x in &layer.weights {
                w.write_i8(x)?;
            }
            w.write_i32::<LittleEndian>(layer.bias)?;
        }
        Ok(())
    }

    pub fn read_network<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let f = File::open(path)?;
        let mut r = BufReader::new(f);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(bad_data("not a packed network file"));
        }
        let version = r.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(bad_data("unsupported network version"));
        }
        let hash = r.read_u32::<LittleEndian>()?;
        let input_dim = r.read_u32::<LittleEndian>()? as usize;
        let hidden = r.read_u32::<LittleEndian>()? as usize;
        let num_variants = r.read_u32::<LittleEndian>()? as usize;
        let qa = r.read_u16::<LittleEndian>()? as i32;
        let qb = r.read_u16::<LittleEndian>()? as i32;

        if input_dim != INPUT_DIM
            || hidden == 0
            || hidden > MAX_HIDDEN
            || num_variants == 0
            || num_variants > MAX_VARIANTS
        {
            return Err(bad_data("architecture descriptor out of range"));
        }
        if hash != Self::arch_hash(hidden, num_variants) {
            return Err(bad_data("architecture hash mismatch"));
        }
        if qa == 0 || qb == 0 {
            return Err(bad_data("zero quantization scale"));
        }

        let mut ft_weights = vec![0i16; INPUT_DIM * hidden];
        r.read_i16_into::<LittleEndian>(&mut ft_weights)?;
        let mut ft_bias = vec![0i16; hidden];
        r.read_i16_into::<LittleEndian>(&mut ft_bias)?;

        let mut variants = Vec::with_capacity(num_variants);
        for _ in 0..num_variants {
            let mut raw = vec![0u8; 2 * hidden];
            r.read_exact(&mut raw)?;
            let weights = raw.into_iter().map(|b| b as i8).collect();
            let bias = r.read_i32::<LittleEndian>()?;
            variants.push(OutputLayer { weights, bias });
        }

        let mut rest = [0u8; 1];
        if r.read(&mut rest)? != 0 {
            return Err(bad_data("trailing bytes after weights"));
        }

        Ok(Self {
            hidden,
            ft_weights,
            ft_bias,
            variants,
            qa,
            qb,
        })
    }
}

fn bad_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Feature indexing
impl PackedNetwork {
    /// Features are king-relative per perspective: black's board is flipped
    /// vertically, and a king on files e-h mirrors the board horizontally.
    pub fn feature_index(
        persp: Color,
        king_sq: Square,
        pc: Piece,
        color: Color,
        sq: Square,
    ) -> usize {
        let mut s = sq.to_index();
        let mut k = king_sq.to_index();
        if persp == Color::Black {
            s ^= 56;
            k ^= 56;
        }
        if k % 8 >= 4 {
            s ^= 7;
        }
        let piece_slot = pc.to_index() * 2 + usize::from(color != persp);
        piece_slot * 64 + s
    }

    pub fn variant_for(&self, num_pieces: u32) -> usize {
        let bucket = (num_pieces.saturating_sub(1) / 4) as usize;
        bucket.min(self.variants.len() - 1)
    }
}

/// Evaluation
impl PackedNetwork {
    /// Raw output in `OUTPUT_SCALE` units, relative to `stm`. The
    /// accumulator must be current for the position being evaluated.
    pub fn evaluate(&self, accum: &Accumulator, stm: Color, variant: usize) -> i32 {
        let layer = &self.variants[variant];
        let mut out = layer.bias;

        let persps = [stm.to_index(), (!stm).to_index()];
        for (half, &p) in persps.iter().enumerate() {
            let weights = &layer.weights[half * self.hidden..(half + 1) * self.hidden];
            let acts = &accum.vals[p][..self.hidden];
            for (w, a) in weights.iter().zip(acts) {
                let clipped = (*a as i32).clamp(0, self.qa);
                out += *w as i32 * clipped;
            }
        }

        out * OUTPUT_SCALE / (self.qa * self.qb)
    }

    /// From-scratch evaluation without a maintained accumulator.
    pub fn evaluate_position(&self, pos: &Position) -> i32 {
        let mut accum = Accumulator::new();
        accumulator::refresh(self, pos, &mut accum);
        let variant = self.variant_for(pos.num_pieces());
        self.evaluate(&accum, pos.side_to_move(), variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_round_trip() {
        let net = PackedNetwork::random(7, 64, 4);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.sbnn");
        net.write_network(&path).unwrap();
        let loaded = PackedNetwork::read_network(&path).unwrap();
        assert_eq!(net, loaded);
    }

    #[test]
    fn bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.sbnn");
        std::fs::write(&path, b"XXXX0000000000000000").unwrap();
        let err = PackedNetwork::read_network(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn arch_hash_mismatch_rejected() {
        let net = PackedNetwork::random(7, 64, 4);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.sbnn");
        net.write_network(&path).unwrap();

        // corrupt the stored hash
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[8] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        assert!(PackedNetwork::read_network(&path).is_err());
    }

    #[test]
    fn variant_selection_by_piece_count() {
        let net = PackedNetwork::random(3, 32, 8);
        assert_eq!(net.variant_for(32), 7);
        assert_eq!(net.variant_for(2), 0);
        assert_eq!(net.variant_for(5), 1);
        let small = PackedNetwork::random(3, 32, 2);
        assert_eq!(small.variant_for(32), 1);
    }

    #[test]
    fn evaluation_is_stm_relative() {
        use crate::evaluate::test_util::mirror_fen;
        let net = PackedNetwork::random(11, 32, 4);
        let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3";
        let pos = Position::from_fen(fen).unwrap();
        let mirrored = Position::from_fen(&mirror_fen(fen)).unwrap();
        assert_eq!(
            net.evaluate_position(&pos),
            net.evaluate_position(&mirrored)
        );
    }
}
