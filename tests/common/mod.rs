//! Shared fixtures for integration tests.

use std::io::Write;
use std::path::PathBuf;

use api_proxy_compiler::assembler::{ConfigSnapshot, HttpFilter};
use api_proxy_compiler::auth::{CompiledAuthPolicy, JwtProvider};
use api_proxy_compiler::ServiceDescription;
use serde_json::json;
use std::collections::BTreeMap;

pub const SERVICE_NAME: &str = "bookstore.endpoints.example.com";
pub const API: &str = "endpoints.examples.bookstore.Bookstore";

pub fn selector(method: &str) -> String {
    format!("{}.{}", API, method)
}

/// The bookstore description in its JSON wire form.
pub fn bookstore_json() -> serde_json::Value {
    json!({
        "name": SERVICE_NAME,
        "id": "2026-10-01r0",
        "apis": [{
            "name": API,
            "version": "v1",
            "methods": [
                { "name": "ListShelves" },
                { "name": "GetShelf" },
                { "name": "UpdateShelf" },
                { "name": "UndeleteShelf" },
                { "name": "StreamShelves", "responseStreaming": true },
                { "name": "GetPet" },
                { "name": "SearchDog" },
                { "name": "Healthz" }
            ]
        }],
        "http": {
            "rules": [
                { "selector": selector("ListShelves"), "get": "/v1/shelves" },
                { "selector": selector("GetShelf"), "get": "/v1/shelves/{shelf}" },
                { "selector": selector("UpdateShelf"), "post": "/v1/shelves/{shelf}", "body": "*" },
                { "selector": selector("UndeleteShelf"), "post": "/v1/shelves/{shelf}:undelete" },
                { "selector": selector("StreamShelves"), "get": "/v1/shelves:stream" },
                { "selector": selector("GetPet"), "get": "/pet/{pet_id}/num/{number}" },
                { "selector": selector("SearchDog"), "get": "/searchdog" },
                { "selector": selector("Healthz"), "get": "/healthz" }
            ]
        },
        "authentication": {
            "providers": [
                { "id": "providerA", "issuer": "https://a.example.com", "jwksUri": "https://a.example.com/jwks" },
                { "id": "providerB", "issuer": "https://b.example.com", "jwksUri": "https://b.example.com/jwks" },
                { "id": "defaultAud", "issuer": "https://c.example.com", "jwksUri": "https://c.example.com/jwks" }
            ],
            "rules": [
                {
                    "selector": selector("GetShelf"),
                    "requirements": [
                        { "providerId": "providerA", "audiences": "audX" },
                        { "providerId": "providerB", "audiences": "audY" }
                    ]
                },
                {
                    "selector": selector("ListShelves"),
                    "requirements": [{ "providerId": "defaultAud" }]
                }
            ]
        },
        "backend": {
            "rules": [
                {
                    "selector": selector("GetPet"),
                    "address": "https://pets.example.com/petstore",
                    "pathTranslation": "CONSTANT_ADDRESS",
                    "jwtAudience": "https://pets.example.com"
                },
                {
                    "selector": selector("SearchDog"),
                    "address": "https://dogs.example.com/api/",
                    "pathTranslation": "APPEND_PATH_TO_ADDRESS"
                },
                {
                    "selector": selector("StreamShelves"),
                    "address": "https://shelves.example.com",
                    "deadline": 10.0
                }
            ]
        },
        "usage": {
            "rules": [
                { "selector": selector("Healthz"), "skipServiceControl": true, "allowUnregisteredCalls": true }
            ]
        },
        "control": { "environment": "servicecontrol.example.com" }
    })
}

pub fn bookstore() -> ServiceDescription {
    serde_json::from_value(bookstore_json()).expect("bookstore fixture deserializes")
}

/// Providers and per-operation requirements from the JWT filter.
pub fn jwt_filter(snapshot: &ConfigSnapshot) -> (&BTreeMap<String, JwtProvider>, &BTreeMap<String, CompiledAuthPolicy>) {
    snapshot
        .listener
        .http_filters
        .iter()
        .find_map(|f| match f {
            HttpFilter::JwtAuthn { providers, requirements } => Some((providers, requirements)),
            _ => None,
        })
        .expect("jwt filter present")
}

/// Write `content` into a fresh temp dir as `name`.
#[allow(dead_code)]
pub fn write_temp(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}
