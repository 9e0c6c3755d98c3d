use culvert::{
    blocking_read_all,
    buffer::Buffer,
    error::Error,
    pipe,
    stage::{stage, try_stage},
    Closer, Sink, Source,
};
use futures::executor::ThreadPool;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct Request {
    name: Mutex<String>,
}

impl Request {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: Mutex::new(name.to_string()),
        })
    }

    fn prefix(&self, prefix: &str) {
        let mut name = self.name.lock().unwrap();
        name.insert_str(0, prefix);
    }

    fn name(&self) -> String {
        self.name.lock().unwrap().clone()
    }
}

#[test]
fn chained_stages() {
    let pool = ThreadPool::new().unwrap();
    let input = Buffer::from(vec![Request::new("m")]);

    let a = stage(&pool, input, |request: Arc<Request>| {
        request.prefix("a");
        Some(request)
    })
    .unwrap();
    let mut b = stage(&pool, a, |request: Arc<Request>| {
        request.prefix("b");
        Some(request)
    })
    .unwrap();

    let result = b.blocking_read().unwrap().unwrap();
    assert_eq!(result.name(), "bam");
    assert_eq!(b.blocking_read().unwrap().map(|r| r.name()), None);
}

#[test]
fn stage_filters() {
    let pool = ThreadPool::new().unwrap();
    let input = (0..100).collect::<Buffer<u32>>();
    let odd = stage(&pool, input, |x: u32| (x % 2 == 1).then(|| x)).unwrap();
    let squares = stage(&pool, odd, |x: u32| Some(u64::from(x) * u64::from(x))).unwrap();

    let expected = (0..100u64).filter(|x| x % 2 == 1).map(|x| x * x).collect::<Vec<_>>();
    assert_eq!(blocking_read_all(squares).unwrap(), expected);
}

#[test]
fn upstream_error_is_forwarded() {
    let pool = ThreadPool::new().unwrap();
    let (reader, mut writer) = pipe();
    let output = stage(&pool, reader, |x: u32| Some(x + 1)).unwrap();
    let output = stage(&pool, output, |x: u32| Some(x * 2)).unwrap();

    writer.blocking_write(1).unwrap();
    writer.close_with_error("upstream failed");
    let cause = match blocking_read_all(output) {
        Err(Error::Closed(cause)) => cause,
        other => panic!("expected the upstream error, got {:?}", other),
    };
    assert_eq!(cause.to_string(), "upstream failed");
}

#[test]
fn upstream_cause_is_shared() {
    let pool = ThreadPool::new().unwrap();
    let (reader, writer) = pipe::<u32>();
    let mut output = stage(&pool, reader, Some).unwrap();

    writer.close_with_error("boom");
    let first = output.blocking_read();
    let second = output.blocking_read();
    match (first, second) {
        (Err(Error::Closed(a)), Err(Error::Closed(b))) => assert!(Arc::ptr_eq(&a, &b)),
        other => panic!("expected two errors, got {:?}", other),
    }
}

#[test]
fn failing_transform_closes_output() {
    let pool = ThreadPool::new().unwrap();
    let input = Buffer::from(vec!["1", "2", "x", "4"]);
    let mut output = try_stage(&pool, input, |s: &str| s.parse::<u32>().map(Some)).unwrap();

    assert_eq!(output.blocking_read().unwrap(), Some(1));
    assert_eq!(output.blocking_read().unwrap(), Some(2));
    match output.blocking_read() {
        Err(Error::Closed(cause)) => assert_eq!(cause.to_string(), "invalid digit found in string"),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn stage_stops_when_output_is_dropped() {
    let pool = ThreadPool::new().unwrap();
    let (reader, mut writer) = pipe();
    let output = stage(&pool, reader, |x: u32| Some(x)).unwrap();

    writer.blocking_write(1).unwrap();
    drop(output);

    // Once the stage gives up, it drops its input and further writes fail.
    let mut failed = false;
    for value in 2..1000 {
        if writer.blocking_write(value).is_err() {
            failed = true;
            break;
        }
    }
    assert!(failed);
}
