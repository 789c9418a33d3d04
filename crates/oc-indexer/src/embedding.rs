//! Embedding Adapter (spec §4.2/§4.3): turns a symbol into a fixed-size
//! vector for the Vector Store.
//!
//! The real embedding model lives outside this crate's scope (spec §4.2
//! treats it as an external `encode(texts) -> vectors` collaborator); this
//! module supplies the adapter boundary that calls it and feeds the result
//! to `VectorStore::add_vector`. In the absence of a model artifact to load,
//! `HashEmbedder` derives a deterministic unit vector from n-gram hashes of
//! the symbol's text, which keeps the interface, the batching, and the
//! call sites real and exercised end to end.

use oc_core::CodeSymbol;

/// Produces embedding vectors for a batch of symbols.
///
/// Implementations must be deterministic: the same symbol text always
/// yields the same vector, so re-indexing unchanged code never perturbs
/// nearest-neighbor results.
pub trait TextEmbedder: Send + Sync {
    /// Target vector dimension.
    fn dimension(&self) -> usize;

    /// Encode a batch of texts into unit-length vectors, one per input.
    fn encode(&self, texts: &[String]) -> Vec<Vec<f32>>;
}

/// Deterministic hash-based embedder.
///
/// Splits the input into overlapping trigrams, hashes each into a bucket
/// via XXH3, and accumulates a signed contribution per bucket. The result
/// is L2-normalized so cosine distance in the vector store behaves the
/// same way it would for a learned embedding.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimension];
        if text.is_empty() {
            v[0] = 1.0;
            return v;
        }

        let bytes = text.as_bytes();
        let ngram = 3usize.min(bytes.len());
        for window in bytes.windows(ngram.max(1)) {
            let h = xxhash_rust::xxh3::xxh3_64(window);
            let bucket = (h % self.dimension as u64) as usize;
            // Use a second, independent bit of the hash to decide sign so
            // buckets don't only ever accumulate positively.
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }

        l2_normalize(&mut v);
        v
    }
}

impl TextEmbedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    } else {
        v[0] = 1.0;
    }
}

/// Build the embedding input text for a symbol: `"{kind} {name} {signature}"`,
/// falling back to the doc comment and body text when a signature is absent
/// so unsignatured symbols (e.g. plain variables, file-level chunks) still
/// embed something meaningful.
pub fn embedding_text(symbol: &CodeSymbol) -> String {
    let kind_str = format!("{:?}", symbol.kind);
    let mut parts: Vec<&str> = vec![];
    parts.push(kind_str.as_str());
    parts.push(symbol.name.as_str());
    if let Some(sig) = symbol.signature.as_deref() {
        parts.push(sig);
    }
    if let Some(doc) = symbol.doc_comment.as_deref() {
        parts.push(doc);
    }
    let mut text = parts.join(" ");
    if text.trim().is_empty() {
        if let Some(body) = symbol.body_text.as_deref() {
            text = body.to_string();
        }
    }
    text
}

/// Encode a batch of symbols with `embedder` and return `(symbol_id, vector)`
/// pairs in the same order as `symbols`.
pub fn embed_symbols(
    embedder: &dyn TextEmbedder,
    symbols: &[CodeSymbol],
) -> Vec<(oc_core::SymbolId, Vec<f32>)> {
    let texts: Vec<String> = symbols.iter().map(embedding_text).collect();
    let vectors = embedder.encode(&texts);
    symbols
        .iter()
        .zip(vectors)
        .map(|(sym, vec)| (sym.id, vec))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_core::{Language, SymbolId, SymbolKind};
    use std::path::PathBuf;

    fn make_symbol(name: &str, signature: &str) -> CodeSymbol {
        CodeSymbol {
            id: SymbolId::generate("ws", "a.py", name, 0, 10),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind: SymbolKind::Function,
            language: Language::Python,
            file_path: PathBuf::from("a.py"),
            byte_range: 0..10,
            line_range: 0..1,
            signature: Some(signature.to_string()),
            doc_comment: None,
            ..Default::default()
        }
    }

    #[test]
    fn embedding_is_deterministic() {
        let embedder = HashEmbedder::new(384);
        let sym = make_symbol("create_user", "def create_user(name: str) -> dict");
        let a = embedder.embed_one(&embedding_text(&sym));
        let b = embedder.embed_one(&embedding_text(&sym));
        assert_eq!(a, b);
    }

    #[test]
    fn embedding_is_unit_length() {
        let embedder = HashEmbedder::new(384);
        let sym = make_symbol("create_user", "def create_user(name: str) -> dict");
        let v = embedder.embed_one(&embedding_text(&sym));
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
    }

    #[test]
    fn different_text_yields_different_vector() {
        let embedder = HashEmbedder::new(384);
        let a = embedder.embed_one(&embedding_text(&make_symbol(
            "create_user",
            "def create_user(name: str) -> dict",
        )));
        let b = embedder.embed_one(&embedding_text(&make_symbol(
            "delete_user",
            "def delete_user(user_id: int) -> bool",
        )));
        assert_ne!(a, b);
    }

    #[test]
    fn batch_encode_matches_dimension() {
        let embedder = HashEmbedder::new(128);
        let symbols = vec![
            make_symbol("foo", "def foo()"),
            make_symbol("bar", "def bar()"),
        ];
        let pairs = embed_symbols(&embedder, &symbols);
        assert_eq!(pairs.len(), 2);
        for (_, v) in &pairs {
            assert_eq!(v.len(), 128);
        }
    }

    #[test]
    fn empty_text_still_produces_unit_vector() {
        let embedder = HashEmbedder::new(32);
        let v = embedder.embed_one("");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
