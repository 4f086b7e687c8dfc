//! nginx.conf rendering
//!
//! Fixed grammar: an `http` block holding one `upstream` per entry in
//! `Backend::upstreams` followed by one `server` per host, each with one
//! `location` per path. Every server listens on the same port.

use crate::proxy::backend::Backend;

const HEADER: &str = "events {
    worker_connections 4096;
}

http {
    real_ip_header    X-Forwarded-For;
    set_real_ip_from  0.0.0.0/0;
    real_ip_recursive on;
";

const PROXY_HEADERS: &str = "        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
";

/// Render `backend` as a complete nginx configuration
pub fn render(backend: &Backend, listen_port: u16) -> String {
    let mut out = String::from(HEADER);

    for (name, endpoints) in backend.upstreams() {
        out.push_str(&format!("\n    upstream {} {{\n", name));
        out.push_str("        ip_hash;\n");
        for endpoint in endpoints {
            out.push_str(&format!("        server {};\n", endpoint));
        }
        out.push_str("    }\n");
    }

    for (host, locations) in backend.servers() {
        out.push_str("\n    server {\n");
        out.push_str(&format!("        listen      {};\n", listen_port));
        out.push_str(&format!("        server_name {};\n", host));
        out.push_str(PROXY_HEADERS);
        for location in locations {
            out.push_str(&format!("\n        location {} {{\n", location.path));
            out.push_str(&format!(
                "            proxy_pass http://{};\n",
                location.upstream
            ));
            out.push_str("        }\n");
        }
        out.push_str("    }\n");
    }

    out.push_str("}\n");
    out
}
