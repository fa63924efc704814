use std::io::BufReader;

use color_eyre::Result as EyreResult;
use eyre::eyre;
use hyper::{body::Bytes, header, Body, Method, Request, Response, Uri};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio_rustls::rustls;

use crate::{
    error::{Error, Result},
    settings::LightifySettings,
};

pub type HyperHttpsClient =
    hyper::Client<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>;

pub fn mk_hyper_https_client(settings: &LightifySettings) -> EyreResult<HyperHttpsClient> {
    let builder = hyper_rustls::HttpsConnectorBuilder::new();

    // Allow overriding the trusted CA certificates, e.g. when running behind
    // an intercepting proxy
    let builder = match &settings.ca_cert {
        Some(cert) => {
            let certs = rustls_pemfile::certs(&mut BufReader::new(cert.as_bytes()))?;

            let mut roots = rustls::RootCertStore::empty();
            let (valid, _) = roots.add_parsable_certificates(&certs);
            if valid == 0 {
                return Err(eyre!(
                    "No valid certificates found in ca_cert. Check your lightify ca_cert config."
                ));
            }

            let tls_config = rustls::ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(roots)
                .with_no_client_auth();

            builder.with_tls_config(tls_config)
        }
        None => builder.with_webpki_roots(),
    };

    let https = builder.https_or_http().enable_http1().build();

    Ok(hyper::Client::builder().build(https))
}

fn bearer(access_token: &str) -> String {
    format!("Bearer {}", access_token)
}

async fn read_body(response: Response<Body>) -> Result<Bytes> {
    let status = response.status();
    let body_bytes = hyper::body::to_bytes(response.into_body()).await?;

    if !status.is_success() {
        return Err(Error::Status {
            status,
            body: String::from_utf8_lossy(&body_bytes).into_owned(),
        });
    }

    Ok(body_bytes)
}

fn deserialize_body<T: for<'a> Deserialize<'a>>(body_bytes: &[u8]) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_slice(body_bytes);
    let response: T = serde_path_to_error::deserialize(de)?;

    Ok(response)
}

pub async fn mk_get_request<T: for<'a> Deserialize<'a>>(
    client: &HyperHttpsClient,
    uri: &Uri,
    access_token: &str,
) -> Result<T> {
    let request = Request::builder()
        .method(Method::GET)
        .header(header::AUTHORIZATION, bearer(access_token))
        .header(header::ACCEPT, "application/json")
        .uri(uri)
        .body(Body::empty())?;

    debug!("GET {}", uri);

    let result = client.request(request).await?;
    let body_bytes = read_body(result).await?;

    deserialize_body(&body_bytes)
}

pub async fn mk_patch_request<RequestBody, ResponseBody>(
    client: &HyperHttpsClient,
    uri: &Uri,
    access_token: &str,
    body: &RequestBody,
) -> Result<ResponseBody>
where
    RequestBody: Serialize,
    ResponseBody: for<'a> Deserialize<'a>,
{
    let body = serde_json::to_string(body)?;

    debug!("PATCH {} {}", uri, body);

    let request = Request::builder()
        .method(Method::PATCH)
        .header(header::AUTHORIZATION, bearer(access_token))
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "application/json")
        .uri(uri)
        .body(body.into())?;

    let result = client.request(request).await?;
    let body_bytes = read_body(result).await?;

    deserialize_body(&body_bytes)
}

/// Sends an `application/x-www-form-urlencoded` POST without credentials.
pub async fn mk_form_post_request<ResponseBody>(
    client: &HyperHttpsClient,
    uri: &Uri,
    form: &[(&str, &str)],
) -> Result<ResponseBody>
where
    ResponseBody: for<'a> Deserialize<'a>,
{
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form)
        .finish();

    debug!("POST {}", uri);

    let request = Request::builder()
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::ACCEPT, "application/json")
        .uri(uri)
        .body(body.into())?;

    let result = client.request(request).await?;
    let body_bytes = read_body(result).await?;

    deserialize_body(&body_bytes)
}
