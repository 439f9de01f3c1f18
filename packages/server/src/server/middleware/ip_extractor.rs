use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};

/// Client address of the current request
#[derive(Clone, Debug)]
pub struct ClientIp(pub IpAddr);

/// Best guess at the caller's address.
///
/// `X-Forwarded-For` (first hop) wins over `X-Real-IP`, which wins over the
/// socket address. A header that is present but unparseable yields `None`
/// rather than falling through.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        return forwarded
            .to_str()
            .ok()
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse().ok());
    }
    if let Some(real_ip) = headers.get("x-real-ip") {
        return real_ip.to_str().ok().and_then(|s| s.trim().parse().ok());
    }
    peer.map(|addr| addr.ip())
}

/// Store the [`ClientIp`] in request extensions for the guard's log lines.
///
/// `ConnectInfo` is absent when the router is driven in-process.
pub async fn extract_client_ip(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    if let Some(ip) = client_ip(request.headers(), peer) {
        request.extensions_mut().insert(ClientIp(ip));
    }
    next.run(request).await
}
