use std::convert::Infallible;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use hyper_form_data::{encoding_for_label, Form, MultipartRequest, Options, Value};
use log::{debug, error, info};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    pretty_env_logger::init();

    let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| {
        std::env::temp_dir()
            .to_str()
            .expect("Temp dir is not valid UTF-8")
            .to_string()
    });
    let mut options = Options::with_upload_dir(upload_dir);
    if let Ok(label) = std::env::var("FIELD_ENCODING") {
        options.encoding = encoding_for_label(&label).expect("Unknown FIELD_ENCODING");
    }

    let addr = std::env::var("LISTEN_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()
        .expect("Invalid LISTEN_ADDR");

    let make_svc = make_service_fn(move |_conn| {
        let options = options.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, options.clone()))) }
    });

    info!("Listening on http://{}", addr);

    if let Err(e) = Server::bind(&addr).serve(make_svc).await {
        error!("Server error: {}", e);
    }
}

async fn handle(req: Request<Body>, options: Options) -> Result<Response<Body>, Infallible> {
    let multipart = match req.into_multipart_with_options(options) {
        Ok(m) => m,
        Err(e) => return Ok(reply(e.status(), e.to_string())),
    };

    match Form::parse(multipart).await {
        Ok(form) => {
            let mut out = String::new();

            for (name, value) in form.fields.iter() {
                out.push_str(&format!("field {} = {:?}\n", name, value.as_slice()));
            }

            for (name, value) in form.files.iter() {
                for file in value.as_slice() {
                    out.push_str(&format!(
                        "file {} = {} ({} bytes) at {}\n",
                        name,
                        file.original_filename,
                        file.size,
                        file.path.display()
                    ));
                }
                if let Value::List(files) = value {
                    debug!("{} uploaded {} times", name, files.len());
                }
            }

            Ok(reply(StatusCode::OK, out))
        }

        Err(e) => {
            error!("Upload failed: {}", e);
            Ok(reply(e.status(), e.to_string()))
        }
    }
}

fn reply(status: StatusCode, body: String) -> Response<Body> {
    let mut res = Response::new(Body::from(body));
    *res.status_mut() = status;
    res
}
