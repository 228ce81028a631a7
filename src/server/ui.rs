//! Embedded static control page, served without authentication. All API
//! calls it issues carry the token entered by the operator.

pub const CONTROL_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>FTG Control</title>
<style>
  body { font-family: -apple-system, system-ui, sans-serif; max-width: 720px; margin: 2rem auto; padding: 0 1rem; }
  fieldset { margin-bottom: 1rem; border: 1px solid #ccc; border-radius: 6px; }
  button { margin-right: .5rem; }
  pre { background: #f4f4f4; padding: .75rem; border-radius: 6px; overflow-x: auto; min-height: 3rem; }
  input[type=text], input[type=password] { width: 100%; box-sizing: border-box; }
</style>
</head>
<body>
<h1>FTG Control</h1>
<fieldset>
  <legend>Token</legend>
  <input id="token" type="password" placeholder="X-FTG-Token">
</fieldset>
<fieldset>
  <legend>Userbot</legend>
  <button onclick="exec('status')">Status</button>
  <button onclick="exec('start')">Start</button>
  <button onclick="exec('stop')">Stop</button>
  <button onclick="exec('restart')">Restart</button>
</fieldset>
<fieldset>
  <legend>Ask the model</legend>
  <input id="prompt" type="text" placeholder="Prompt">
  <button onclick="llmChat()">Send</button>
</fieldset>
<fieldset>
  <legend>Logs</legend>
  <button onclick="tailLogs()">Tail</button>
</fieldset>
<pre id="out">ready</pre>
<script>
const out = document.getElementById('out');
function headers() {
  return { 'Content-Type': 'application/json',
           'X-FTG-Token': document.getElementById('token').value };
}
async function show(promise) {
  try {
    const resp = await promise;
    out.textContent = JSON.stringify(await resp.json(), null, 2);
  } catch (e) { out.textContent = String(e); }
}
function exec(action) {
  show(fetch('/exec', { method: 'POST', headers: headers(),
                        body: JSON.stringify({ action }) }));
}
function llmChat() {
  const prompt = document.getElementById('prompt').value;
  show(fetch('/llm/chat', { method: 'POST', headers: headers(),
                            body: JSON.stringify({ prompt }) }));
}
function tailLogs() {
  show(fetch('/logs/tail?lines=100', { headers: headers() }));
}
</script>
</body>
</html>
"#;
