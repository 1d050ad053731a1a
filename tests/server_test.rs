// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#[cfg(test)]
mod server_tests {
    //! # 宿主黑盒测试
    //!
    //! 通过真实 TCP 连接访问演示站点（`cargo run -- demo/public`），验证宿主与
    //! 前端控制器的整体行为。需要服务器在 7878 端口运行，因此默认忽略。

    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn send_request(request: &[u8]) -> Result<String, String> {
        let mut stream = TcpStream::connect("127.0.0.1:7878")
            .await
            .map_err(|e| format!("连接失败: {} - 请确保服务器在7878端口运行", e))?;

        stream.write_all(request).await.map_err(|e| e.to_string())?;

        let mut buffer = vec![0; 65536];
        // 设置硬超时，防止服务器挂起时测试永久阻塞
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buffer))
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())?;

        Ok(String::from_utf8_lossy(&buffer[..n]).to_string())
    }

    fn extract_status_code(response: &str) -> u16 {
        response
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .unwrap_or(0)
    }

    fn extract_header<'a>(response: &'a str, name: &str) -> Option<&'a str> {
        response
            .split("\r\n\r\n")
            .next()?
            .lines()
            .skip(1)
            .filter_map(|line| line.split_once(": "))
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    #[tokio::test]
    #[ignore]
    async fn test_home_sets_session_cookie() {
        let response = send_request(b"GET / HTTP/1.1\r\nHost: localhost:7878\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(extract_status_code(&response), 200);
        assert!(extract_header(&response, "Set-Cookie")
            .unwrap()
            .starts_with("webfront_sid="));
        assert_eq!(extract_header(&response, "Server"), Some("webfront"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_wildcard_route_and_controller_header() {
        let response =
            send_request(b"GET /users/42?tab=%3Cb%3Ehistory HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
        assert_eq!(extract_status_code(&response), 200);
        assert_eq!(extract_header(&response, "X-User-Id"), Some("42"));
        assert!(!response.contains("<b>history"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_redirect() {
        let response = send_request(b"GET /back HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(extract_status_code(&response), 302);
        assert_eq!(extract_header(&response, "Location"), Some("/users"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_unknown_path_is_404() {
        let attacks: [&[u8]; 3] = [
            b"GET /nope HTTP/1.1\r\nHost: localhost\r\n\r\n",
            b"GET /../etc/passwd HTTP/1.1\r\nHost: localhost\r\n\r\n",
            b"GET /%2e%2e%2fetc%2fpasswd HTTP/1.1\r\nHost: localhost\r\n\r\n",
        ];
        for attack in attacks {
            let response = send_request(attack).await.unwrap();
            assert_eq!(extract_status_code(&response), 404);
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_malformed_requests() {
        let cases: [(&[u8], u16); 3] = [
            (b"FETCH / HTTP/1.1\r\nHost: localhost\r\n\r\n", 405),
            (b"GET / HTTP/2.0\r\nHost: localhost\r\n\r\n", 505),
            (b"GET / HTTP/1.1\r\nHost: \xff\xfe\r\n\r\n", 400),
        ];
        for (request, expected) in cases {
            let response = send_request(request).await.unwrap();
            assert_eq!(extract_status_code(&response), expected);
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_oversized_body_is_413() {
        let request = format!(
            "POST /users HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n",
            64 * 1024 * 1024
        );
        let response = send_request(request.as_bytes()).await.unwrap();
        assert_eq!(extract_status_code(&response), 413);
    }

    #[tokio::test]
    #[ignore]
    async fn test_overflowing_content_length_is_413() {
        let response = send_request(
            b"POST /users HTTP/1.1\r\nHost: localhost\r\nContent-Length: 18446744073709551615\r\n\r\n",
        )
        .await
        .unwrap();
        assert_eq!(extract_status_code(&response), 413);
    }

    #[tokio::test]
    #[ignore]
    async fn test_endless_header_is_431() {
        let mut request = b"GET / HTTP/1.1\r\nHost: localhost\r\n".to_vec();
        while request.len() <= 32 * 1024 {
            request.extend_from_slice(b"X-Filler: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n");
        }
        let response = send_request(&request).await.unwrap();
        assert_eq!(extract_status_code(&response), 431);
    }

    #[tokio::test]
    #[ignore]
    async fn test_head_has_no_body() {
        let response = send_request(b"HEAD /users HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(extract_status_code(&response), 200);
        assert!(response.ends_with("\r\n\r\n"));
    }
}
