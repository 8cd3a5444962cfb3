//! Index mapping and query bodies for the k-NN index.

use serde_json::{json, Value as JsonValue};

/// Field holding the document vector.
pub const EMBEDDING_FIELD: &str = "embedding";

/// Source fields requested with every search.
pub const SOURCE_FIELDS: [&str; 8] = [
    "title",
    "summary",
    "content",
    "sentiment_label",
    "sentiment_score",
    "category",
    "url",
    "timestamp",
];

/// HNSW graph parameters.
pub const EF_SEARCH: u32 = 100;
pub const EF_CONSTRUCTION: u32 = 128;
pub const M: u32 = 24;

/// Settings and mappings for `PUT /{index}`.
pub fn index_body(dimension: usize) -> JsonValue {
    json!({
        "settings": {
            "index": {
                "knn": true,
                "knn.algo_param.ef_search": EF_SEARCH
            }
        },
        "mappings": {
            "properties": {
                "title": { "type": "text", "analyzer": "standard" },
                "content": { "type": "text", "analyzer": "standard" },
                "summary": { "type": "text", "analyzer": "standard" },
                EMBEDDING_FIELD: {
                    "type": "knn_vector",
                    "dimension": dimension,
                    "method": {
                        "name": "hnsw",
                        "space_type": "cosinesimil",
                        "engine": "lucene",
                        "parameters": {
                            "ef_construction": EF_CONSTRUCTION,
                            "m": M
                        }
                    }
                },
                "sentiment_label": { "type": "keyword" },
                "sentiment_score": { "type": "float" },
                "timestamp": { "type": "date" },
                "url": { "type": "keyword" },
                "category": { "type": "keyword" }
            }
        }
    })
}

/// Body for `POST /{index}/_search`.
pub fn knn_query(embedding: &[f32], k: usize) -> JsonValue {
    json!({
        "size": k,
        "query": {
            "knn": {
                EMBEDDING_FIELD: {
                    "vector": embedding,
                    "k": k
                }
            }
        },
        "_source": SOURCE_FIELDS
    })
}
