//! Retrieval-context XML builder (spec §4.8): the fenced block the chat
//! prompt embeds so citations can reference `S{n}` source ids.
//!
//! Grounded in `rag_graph_service.py::_build_retrieval_context`, which
//! builds this with `xml.sax.saxutils.escape`.

use crate::types::SourceChunk;

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Renders `sources` as a `<source_set>` of `<source>` elements, each
/// carrying its id, document id/name, and a `<context_header>`/
/// `<chunk_text>` pair. An empty source list renders as a self-closing
/// `<source_set empty="true" />`.
pub fn build_retrieval_context(sources: &[SourceChunk]) -> String {
    if sources.is_empty() {
        return "<source_set empty=\"true\" />".to_string();
    }

    let mut xml = String::from("<source_set>\n");
    for source in sources {
        xml.push_str(&format!(
            "<source id=\"{}\" document_id=\"{}\" document_name=\"{}\" chunk_index=\"{}\">\n<context_header>{}</context_header>\n<chunk_text>{}</chunk_text>\n</source>\n",
            escape_xml(&source.source_id),
            escape_xml(&source.document_id),
            escape_xml(&source.document_name),
            source.chunk_index,
            escape_xml(&source.context_header),
            escape_xml(&source.text),
        ));
    }
    xml.push_str("</source_set>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str, text: &str) -> SourceChunk {
        SourceChunk {
            rank: 1,
            source_id: id.to_string(),
            chunk_key: "doc:0".to_string(),
            document_id: "doc".to_string(),
            document_name: "Doc <1>".to_string(),
            chunk_index: 0,
            context_header: "Header & context".to_string(),
            text: text.to_string(),
            dense_score: 0.0,
            sparse_score: 0.0,
            hybrid_score: 0.0,
            original_rank: 1,
            rerank_score: 0.0,
        }
    }

    #[test]
    fn empty_sources_render_self_closing_tag() {
        assert_eq!(build_retrieval_context(&[]), "<source_set empty=\"true\" />");
    }

    #[test]
    fn escapes_reserved_xml_characters() {
        let xml = build_retrieval_context(&[source("S1", "A & B < C")]);
        assert!(xml.contains("<chunk_text>A &amp; B &lt; C</chunk_text>"));
        assert!(xml.contains("document_id=\"doc\""));
        assert!(xml.contains("document_name=\"Doc &lt;1&gt;\""));
    }

    #[test]
    fn renders_context_header_as_child_element() {
        let xml = build_retrieval_context(&[source("S1", "body")]);
        assert!(xml.contains("<context_header>Header &amp; context</context_header>"));
    }
}
