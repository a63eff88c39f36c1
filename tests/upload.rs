//! Program upload tests against the in-memory hub.

mod common;

use std::sync::Arc;

use common::{connected_session, default_reply, test_config, MockHub};
use hublink::message::{
    ClearSlotRequest, ClearSlotResponse, InfoResponse, ProgramFlowRequest, ProgramFlowResponse,
    StartFileUploadResponse, TransferChunkResponse,
};
use hublink::protocol::{crc, crc32};
use hublink::{HubError, Message, ProgramUploader, Session, UploadStage};

fn program(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'a' + (i % 26) as u8).collect()
}

fn chunk_requests(hub: &MockHub) -> Vec<(u32, Vec<u8>)> {
    hub.requests()
        .into_iter()
        .filter_map(|message| match message {
            Message::TransferChunkRequest(chunk) => {
                Some((chunk.running_crc(), chunk.payload().to_vec()))
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_upload_300_bytes_in_three_chunks() {
    let hub = MockHub::new();
    let session = connected_session(&hub, test_config()).await;
    let uploader = ProgramUploader::new(session);
    let program = program(300);

    uploader
        .upload_program("program.py", 4, &program)
        .await
        .unwrap();

    let requests = hub.requests();
    assert_eq!(
        requests[0],
        Message::ClearSlotRequest(ClearSlotRequest::new(4))
    );
    match &requests[1] {
        Message::StartFileUploadRequest(start) => {
            assert_eq!(start.filename(), "program.py");
            assert_eq!(start.slot(), 4);
            assert_eq!(start.crc(), crc32(&program));
        }
        other => panic!("expected StartFileUploadRequest, got {:?}", other),
    }

    let chunks = chunk_requests(&hub);
    assert_eq!(chunks.len(), 3);

    let mut expected_crc = 0;
    for (index, (running_crc, payload)) in chunks.iter().enumerate() {
        let slice = &program[index * 100..(index + 1) * 100];
        assert_eq!(payload.as_slice(), slice);
        expected_crc = crc(slice, expected_crc, 4);
        assert_eq!(*running_crc, expected_crc);
    }
    assert_eq!(requests.len(), 5);
}

#[tokio::test]
async fn test_last_chunk_shorter() {
    let hub = MockHub::new();
    let session = connected_session(&hub, test_config()).await;
    let uploader = ProgramUploader::new(session);

    uploader
        .upload_program("program.py", 0, &program(250))
        .await
        .unwrap();

    let sizes: Vec<usize> = chunk_requests(&hub)
        .iter()
        .map(|(_, payload)| payload.len())
        .collect();
    assert_eq!(sizes, vec![100, 100, 50]);
}

/// A hub whose `InfoResponse` advertises `max_chunk_size`.
async fn session_with_chunk_size(hub: &MockHub, max_chunk_size: u16) -> Session {
    hub.set_responder(move |request| match request {
        Message::InfoRequest(_) => vec![Message::InfoResponse(InfoResponse {
            max_chunk_size,
            ..common::hub_info()
        })],
        other => default_reply(other),
    });
    connected_session(hub, test_config()).await
}

#[tokio::test]
async fn test_unaligned_chunk_size_keeps_checksum_chain() {
    let hub = MockHub::new();
    let session = session_with_chunk_size(&hub, 99).await;
    let uploader = ProgramUploader::new(session);
    let program = program(250);

    uploader
        .upload_program("program.py", 0, &program)
        .await
        .unwrap();

    let chunks = chunk_requests(&hub);
    let sizes: Vec<usize> = chunks.iter().map(|(_, payload)| payload.len()).collect();
    assert_eq!(sizes, vec![96, 96, 58]);

    let (last_crc, _) = chunks.last().unwrap();
    assert_eq!(*last_crc, crc32(&program));
}

#[tokio::test]
async fn test_chunk_size_below_alignment_rejected() {
    let hub = MockHub::new();
    let session = session_with_chunk_size(&hub, 3).await;
    let uploader = ProgramUploader::new(session);

    let result = uploader.upload_program("program.py", 0, b"print(1)").await;

    assert!(matches!(result, Err(HubError::Protocol(_))));
    assert!(hub.requests().is_empty());
}

#[tokio::test]
async fn test_upload_aborts_on_second_chunk_failure() {
    let hub = MockHub::new();
    let session = connected_session(&hub, test_config()).await;
    let mut chunks_seen = 0;
    hub.set_responder(move |request| match request {
        Message::TransferChunkRequest(_) => {
            chunks_seen += 1;
            let response = if chunks_seen == 2 {
                TransferChunkResponse::failed()
            } else {
                TransferChunkResponse::ok()
            };
            vec![Message::TransferChunkResponse(response)]
        }
        other => default_reply(other),
    });
    let uploader = ProgramUploader::new(session);

    let result = uploader.upload_program("program.py", 0, &program(300)).await;

    assert!(matches!(
        result,
        Err(HubError::Upload(UploadStage::TransferChunk { index: 1 }))
    ));
    assert_eq!(chunk_requests(&hub).len(), 2);
}

#[tokio::test]
async fn test_clear_slot_failure_aborts() {
    let hub = MockHub::new();
    let session = connected_session(&hub, test_config()).await;
    hub.set_responder(|request| match request {
        Message::ClearSlotRequest(_) => vec![Message::ClearSlotResponse(ClearSlotResponse::failed())],
        other => default_reply(other),
    });
    let uploader = ProgramUploader::new(session);

    let result = uploader.upload_program("program.py", 0, b"print(1)").await;

    assert!(matches!(result, Err(HubError::Upload(UploadStage::ClearSlot))));
    assert_eq!(hub.requests().len(), 1);
}

#[tokio::test]
async fn test_start_upload_failure_aborts() {
    let hub = MockHub::new();
    let session = connected_session(&hub, test_config()).await;
    hub.set_responder(|request| match request {
        Message::StartFileUploadRequest(_) => vec![Message::StartFileUploadResponse(
            StartFileUploadResponse::failed(),
        )],
        other => default_reply(other),
    });
    let uploader = ProgramUploader::new(session);

    let result = uploader.upload_program("program.py", 0, b"print(1)").await;

    assert!(matches!(
        result,
        Err(HubError::Upload(UploadStage::StartUpload))
    ));
    assert!(chunk_requests(&hub).is_empty());
}

#[tokio::test]
async fn test_invalid_filename_sends_nothing() {
    let hub = MockHub::new();
    let session = connected_session(&hub, test_config()).await;
    let uploader = ProgramUploader::new(session);

    let long_name = "x".repeat(40);
    let result = uploader.upload_program(&long_name, 0, b"pass").await;

    assert!(matches!(result, Err(HubError::Protocol(_))));
    assert!(hub.requests().is_empty());
}

#[tokio::test]
async fn test_upload_requires_connection() {
    let hub = MockHub::new();
    let session = Session::new(test_config(), Arc::new(hub.clone())).unwrap();
    let uploader = ProgramUploader::new(session);

    let result = uploader.upload_program("program.py", 0, b"pass").await;
    assert!(matches!(result, Err(HubError::Disconnected)));
}

#[tokio::test]
async fn test_start_and_stop_program() {
    let hub = MockHub::new();
    let session = connected_session(&hub, test_config()).await;
    let uploader = ProgramUploader::new(session);

    uploader.start_program(2).await.unwrap();
    uploader.stop_program(2).await.unwrap();

    assert_eq!(
        hub.requests(),
        vec![
            Message::ProgramFlowRequest(ProgramFlowRequest::start(2)),
            Message::ProgramFlowRequest(ProgramFlowRequest::stop(2)),
        ]
    );
}

#[tokio::test]
async fn test_program_control_failure() {
    let hub = MockHub::new();
    let session = connected_session(&hub, test_config()).await;
    hub.set_responder(|request| match request {
        Message::ProgramFlowRequest(_) => {
            vec![Message::ProgramFlowResponse(ProgramFlowResponse::failed())]
        }
        other => default_reply(other),
    });
    let uploader = ProgramUploader::new(session);

    let result = uploader.start_program(0).await;
    assert!(matches!(result, Err(HubError::ProgramControl(_))));
}

#[tokio::test]
async fn test_upload_and_run() {
    let hub = MockHub::new();
    let session = connected_session(&hub, test_config()).await;
    let uploader = ProgramUploader::new(session);

    uploader
        .upload_and_run("program.py", 1, b"print('hi')\n")
        .await
        .unwrap();

    let requests = hub.requests();
    assert_eq!(
        requests.last(),
        Some(&Message::ProgramFlowRequest(ProgramFlowRequest::start(1)))
    );
    assert_eq!(chunk_requests(&hub).len(), 1);
}
