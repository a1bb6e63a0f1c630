use mediacore::{Node, NodeKind, TargetPort, Workflow, WorkflowError};

/// Photo, video frame and two text fragments converging on one LLM node.
pub fn product_marketing_kit() -> Result<Workflow, WorkflowError> {
    let mut workflow = Workflow::new("Product Marketing Kit Generator");
    workflow.description = Some("Crop a product photo, grab a hero frame from the promo video and write ad copy from both".to_string());

    let nodes = [
        Node::with_id("img-1", NodeKind::UploadImage)
            .with_label("Product Photo")
            .with_output("https://picsum.photos/seed/product/400/300")
            .with_position(50.0, 50.0),
        Node::with_id("crop-1", NodeKind::CropImage)
            .with_label("Center Crop")
            .with_position(400.0, 50.0),
        Node::with_id("txt-1", NodeKind::Text)
            .with_label("Copywriter Persona")
            .with_value("You are a professional copywriter for luxury tech brands. Write catchy marketing posts.")
            .with_position(50.0, 400.0),
        Node::with_id("txt-2", NodeKind::Text)
            .with_label("Product Details")
            .with_value("Product: Ultra-slim Noise Cancelling Headphones. Features: 40hr battery, Carbon Fiber build.")
            .with_position(400.0, 450.0),
        Node::with_id("vid-1", NodeKind::UploadVideo)
            .with_label("Promo Video")
            .with_position(50.0, 650.0),
        Node::with_id("frame-1", NodeKind::ExtractFrame)
            .with_label("Hero Frame")
            .with_position(400.0, 650.0),
        Node::with_id("llm-1", NodeKind::RunLlm)
            .with_label("Generate Ad Content")
            .with_position(800.0, 350.0),
    ];
    for node in nodes {
        workflow.add_node(node)?;
    }

    workflow.connect("img-1", "crop-1", None)?;
    workflow.connect("crop-1", "llm-1", Some(TargetPort::Image))?;
    workflow.connect("txt-1", "llm-1", Some(TargetPort::Text))?;
    workflow.connect("txt-2", "llm-1", Some(TargetPort::Text))?;
    workflow.connect("vid-1", "frame-1", None)?;
    workflow.connect("frame-1", "llm-1", Some(TargetPort::Image))?;

    Ok(workflow)
}
