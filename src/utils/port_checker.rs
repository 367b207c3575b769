use std::net::TcpListener;

/// 检查端口是否仍可绑定；不可绑定通常意味着有残留的后端进程
pub fn is_port_available(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_port_is_unavailable() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!is_port_available("127.0.0.1", port));

        drop(listener);
        assert!(is_port_available("127.0.0.1", port));
    }
}
