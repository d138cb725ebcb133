//! HTTP server assembly.
//!
//! Built from actix-http directly instead of `HttpServer` so the
//! `Expect: 100-continue` answer goes through `api::admit_expectation`.
//! A rejected upload gets its error response in place of `100 Continue`.

use std::io;
use std::net::TcpListener;

use actix_http::{HttpService, Request};
use actix_server::Server;
use actix_service::{fn_service, map_config};
use actix_web::dev;
use actix_web::middleware::Logger;
use actix_web::{web, App};
use log::debug;

use crate::api;
use crate::app_state::AppState;

/// Serve `state` on an already bound listener.
pub fn build(listener: TcpListener, state: AppState, workers: usize) -> io::Result<Server> {
    let local_addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    let data = web::Data::new(state);

    let server = Server::build()
        .workers(workers.max(1))
        .listen("curldrop", listener, move || {
            let uploads = data.uploads.clone();
            let app = App::new()
                .wrap(Logger::default())
                .app_data(data.clone())
                .configure(api::configure);

            HttpService::build()
                .local_addr(local_addr)
                .expect(fn_service(move |req: Request| {
                    let uploads = uploads.clone();
                    async move {
                        if let Err(e) = api::admit_expectation(&uploads, &req) {
                            debug!("Refusing to continue {}: {}", req.path(), e);
                            return Err(actix_web::Error::from(e));
                        }
                        Ok(req)
                    }
                }))
                .finish(map_config(app, |_| dev::AppConfig::default()))
                .tcp()
        })?
        .run();

    Ok(server)
}
