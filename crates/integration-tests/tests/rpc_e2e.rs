//! JSON-RPC round trips against a server bound to an ephemeral port

use jsonrpsee::core::client::{ClientT, Error as ClientError};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use jsonrpsee::server::ServerHandle;
use provisionerd_api_rpc::error::code;
use provisionerd_api_rpc::types::{
    AcquireJobRequest, AcquireJobResponse, GetJobRequest, GetJobResponse, PostJobRequest,
    PostJobResponse,
};
use provisionerd_api_rpc::{RpcServer, RpcServerConfig};
use provisionerd_core::domain::{JobStatus, ProvisionerJobType, ProvisionerType, Tags};
use provisionerd_integration_tests::TestEnv;
use std::time::Duration;
use uuid::Uuid;

async fn start_server(env: &TestEnv) -> (ServerHandle, HttpClient) {
    let config = RpcServerConfig {
        port: 0,
        acquire_long_poll: Duration::from_millis(200),
        ..Default::default()
    };
    let (handle, addr) = RpcServer::new(
        config,
        env.acquirer.clone(),
        env.posting.clone(),
        env.lifetime.child_token(),
    )
    .start()
    .await
    .unwrap();

    let client = HttpClientBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .build(format!("http://{}", addr))
        .unwrap();
    (handle, client)
}

fn acquire_request(organization_id: Uuid, tags: Tags) -> AcquireJobRequest {
    AcquireJobRequest {
        organization_id,
        worker_id: Uuid::new_v4(),
        provisioner_types: vec![ProvisionerType::Echo],
        tags,
        timeout_ms: None,
    }
}

#[tokio::test]
async fn test_post_then_acquire_over_rpc() {
    let env = TestEnv::new().await;
    let (server, client) = start_server(&env).await;
    let org = Uuid::new_v4();

    let posted: PostJobResponse = client
        .request(
            "provisioner.post_job.v1",
            rpc_params![PostJobRequest {
                organization_id: org,
                initiator_id: Uuid::new_v4(),
                provisioner_type: ProvisionerType::Echo,
                job_type: ProvisionerJobType::TemplateVersionImport,
                tags: Tags::new(),
                input: serde_json::json!({"template_version_id": "v1"}),
            }],
        )
        .await
        .unwrap();
    assert_eq!(posted.status, JobStatus::Pending);

    let req = acquire_request(org, Tags::untagged());
    let worker_id = req.worker_id;
    let acquired: AcquireJobResponse = client
        .request("provisioner.acquire_job.v1", rpc_params![req])
        .await
        .unwrap();
    let job = acquired.job.expect("job should be acquired");
    assert_eq!(job.id, posted.job_id);
    assert_eq!(job.worker_id, Some(worker_id));
    assert_eq!(job.input["template_version_id"], "v1");

    let fetched: GetJobResponse = client
        .request(
            "provisioner.get_job.v1",
            rpc_params![GetJobRequest {
                job_id: posted.job_id
            }],
        )
        .await
        .unwrap();
    assert_eq!(fetched.status, JobStatus::Running);

    server.stop().unwrap();
}

#[tokio::test]
async fn test_acquire_long_poll_returns_null_job() {
    let env = TestEnv::new().await;
    let (server, client) = start_server(&env).await;

    let mut req = acquire_request(Uuid::new_v4(), Tags::untagged());
    req.timeout_ms = Some(100);
    let acquired: AcquireJobResponse = client
        .request("provisioner.acquire_job.v1", rpc_params![req])
        .await
        .unwrap();
    assert!(acquired.job.is_none());
    assert_eq!(env.acquirer.active_domains(), 0);

    server.stop().unwrap();
}

#[tokio::test]
async fn test_acquire_rejects_nul_tags() {
    let env = TestEnv::new().await;
    let (server, client) = start_server(&env).await;

    let req = acquire_request(Uuid::new_v4(), Tags::from([("environment", "on\0prem")]));
    let err = client
        .request::<AcquireJobResponse, _>("provisioner.acquire_job.v1", rpc_params![req])
        .await
        .unwrap_err();
    match err {
        ClientError::Call(obj) => assert_eq!(obj.code(), code::VALIDATION_ERROR),
        other => panic!("unexpected error: {other}"),
    }

    server.stop().unwrap();
}

#[tokio::test]
async fn test_get_unknown_job_is_not_found() {
    let env = TestEnv::new().await;
    let (server, client) = start_server(&env).await;

    let err = client
        .request::<GetJobResponse, _>(
            "provisioner.get_job.v1",
            rpc_params![GetJobRequest {
                job_id: Uuid::new_v4()
            }],
        )
        .await
        .unwrap_err();
    match err {
        ClientError::Call(obj) => assert_eq!(obj.code(), code::NOT_FOUND),
        other => panic!("unexpected error: {other}"),
    }

    server.stop().unwrap();
}

#[tokio::test]
async fn test_shutdown_ends_pending_long_poll() {
    let env = TestEnv::new().await;
    let (server, client) = start_server(&env).await;

    let mut req = acquire_request(Uuid::new_v4(), Tags::untagged());
    req.timeout_ms = Some(30_000);
    let pending = tokio::spawn(async move {
        client
            .request::<AcquireJobResponse, _>("provisioner.acquire_job.v1", rpc_params![req])
            .await
    });

    tokio::time::timeout(Duration::from_secs(10), async {
        while env.acquirer.active_domains() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    env.lifetime.cancel();

    let err = tokio::time::timeout(Duration::from_secs(10), pending)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    match err {
        ClientError::Call(obj) => assert_eq!(obj.code(), code::CANCELED),
        other => panic!("unexpected error: {other}"),
    }

    server.stop().unwrap();
}
