use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use http::{Method, Request, Response, StatusCode};
use kube::{client::Body, Client};
use serde_json::{json, Value};
use tower_test::mock;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ObjectPath {
    resource: String,
    namespace: String,
    name: String,
}

#[derive(Debug)]
struct Target {
    path: ObjectPath,
    has_name: bool,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<ObjectPath, Value>,
    last_version: u64,
    conflicts: usize,
    rejection: Option<u16>,
    requests: Vec<(Method, String)>,
}

/// Minimal API server behind a `tower_test` mock: keeps objects in memory,
/// issues resource versions, honours resource version preconditions and can
/// be told to answer with conflicts or a fixed error.
#[derive(Clone, Default)]
pub struct FakeApiServer {
    inner: Arc<Mutex<Inner>>,
}

impl FakeApiServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, resource: &str, object: Value) {
        let namespace = object["metadata"]["namespace"].as_str().unwrap_or_default().to_owned();
        let name = object["metadata"]["name"].as_str().unwrap_or_default().to_owned();
        let path = ObjectPath {
            resource: resource.to_owned(),
            namespace,
            name,
        };
        self.inner.lock().unwrap().objects.insert(path, object);
    }

    pub fn get(&self, resource: &str, namespace: &str, name: &str) -> Option<Value> {
        let path = ObjectPath {
            resource: resource.to_owned(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        };
        self.inner.lock().unwrap().objects.get(&path).cloned()
    }

    /// The next `count` writes are answered with 409 Conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.inner.lock().unwrap().conflicts = count;
    }

    /// Every request is answered with `code`.
    pub fn reject_with(&self, code: u16) {
        self.inner.lock().unwrap().rejection = Some(code);
    }

    pub fn requests(&self) -> Vec<(Method, String)> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn writes(&self) -> Vec<(Method, String)> {
        self.requests().into_iter().filter(|(method, _)| *method != Method::GET).collect()
    }

    pub fn client(&self) -> Client {
        let (mock_service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        tokio::spawn(self.clone().serve(handle));
        Client::new(mock_service, "default")
    }

    async fn serve(self, mut handle: mock::Handle<Request<Body>, Response<Body>>) {
        while let Some((request, send)) = handle.next_request().await {
            let (parts, body) = request.into_parts();
            let body = body.collect_bytes().await.unwrap();
            let body: Value = if body.is_empty() { Value::Null } else { serde_json::from_slice(&body).unwrap() };
            let response = self.handle(&parts.method, parts.uri.path(), body);
            send.send_response(response);
        }
    }

    fn handle(&self, method: &Method, path: &str, body: Value) -> Response<Body> {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.push((method.clone(), path.to_owned()));
        if let Some(code) = inner.rejection {
            return status(code, "Rejected", "rejected by fake api server");
        }
        let Some(target) = parse(path) else {
            return status(404, "NotFound", path);
        };

        match *method {
            Method::GET if target.has_name => match inner.objects.get(&target.path) {
                Some(object) => respond(StatusCode::OK, object),
                None => status(404, "NotFound", &target.path.name),
            },
            Method::POST => {
                let mut object = body;
                let path = ObjectPath {
                    name: object["metadata"]["name"].as_str().unwrap_or_default().to_owned(),
                    ..target.path
                };
                if inner.objects.contains_key(&path) {
                    return status(409, "AlreadyExists", &path.name);
                }
                inner.last_version += 1;
                object["metadata"]["resourceVersion"] = json!(inner.last_version.to_string());
                if !path.namespace.is_empty() {
                    object["metadata"]["namespace"] = json!(path.namespace);
                }
                inner.objects.insert(path, object.clone());
                respond(StatusCode::CREATED, &object)
            }
            Method::PUT | Method::PATCH if target.has_name => {
                if inner.conflicts > 0 {
                    inner.conflicts -= 1;
                    return status(409, "Conflict", "the object has been modified");
                }
                let Some(stored) = inner.objects.get(&target.path).cloned() else {
                    return status(404, "NotFound", &target.path.name);
                };
                let expected_version = &body["metadata"]["resourceVersion"];
                if !expected_version.is_null() && *expected_version != stored["metadata"]["resourceVersion"] {
                    return status(409, "Conflict", "the object has been modified");
                }
                let mut object = if *method == Method::PUT {
                    body
                } else {
                    let mut object = stored;
                    merge_patch(&mut object, &body);
                    object
                };
                inner.last_version += 1;
                object["metadata"]["resourceVersion"] = json!(inner.last_version.to_string());
                inner.objects.insert(target.path, object.clone());
                respond(StatusCode::OK, &object)
            }
            Method::DELETE if target.has_name => match inner.objects.remove(&target.path) {
                Some(object) => respond(StatusCode::OK, &object),
                None => status(404, "NotFound", &target.path.name),
            },
            _ => status(405, "MethodNotAllowed", path),
        }
    }
}

fn parse(path: &str) -> Option<Target> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let rest = match segments.first()? {
        &"api" => segments.get(2..)?,
        &"apis" => segments.get(3..)?,
        _ => return None,
    };
    let (namespace, rest) = if rest.first() == Some(&"namespaces") && rest.len() >= 3 {
        (rest[1].to_owned(), &rest[2..])
    } else {
        (String::new(), rest)
    };
    let resource = (*rest.first()?).to_owned();
    let name = rest.get(1).map(|name| (*name).to_owned());
    Some(Target {
        has_name: name.is_some(),
        path: ObjectPath {
            resource,
            namespace,
            name: name.unwrap_or_default(),
        },
    })
}

fn merge_patch(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    } else {
        *target = patch.clone();
    }
}

fn respond(code: StatusCode, object: &Value) -> Response<Body> {
    Response::builder().status(code).body(Body::from(serde_json::to_vec(object).unwrap())).unwrap()
}

fn status(code: u16, reason: &str, message: &str) -> Response<Body> {
    let body = json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    });
    Response::builder().status(code).body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap()
}
